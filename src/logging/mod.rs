//! Rotating file logging for rotalog
//!
//! Provides the size-rotating [`FileWriter`] with background compression and
//! retention, plus the glue that plugs it into tracing-subscriber.

mod compress;
mod error;
mod file_writer;
mod init;
pub mod naming;
mod retention;
mod sink;

pub use compress::{compress_file, CompressedFile, Compressor, PendingCompression};
pub use error::{Result, WriterError};
pub use file_writer::{FileWriter, LOG_DIR_MODE, LOG_FILE_MODE};
pub use init::{build_subscriber, init_logging, LoggingGuard};
pub use retention::{sweep, SweepReport};
pub use sink::{FileWriterMaker, SharedFileWriter};
