//! rotalog - size-rotating log file writer
//!
//! A [`FileWriter`](logging::FileWriter) appends records to an active file,
//! archives it under a timestamped name once it passes a size limit, gzips
//! archives in the background and deletes files past a retention window.

pub mod config;
pub mod logging;

pub use config::WriterConfig;
pub use logging::{FileWriter, WriterError};
