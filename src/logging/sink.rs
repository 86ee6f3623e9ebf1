//! Record sink for tracing-subscriber
//!
//! Lets a `fmt` layer write formatted records into a shared [`FileWriter`].
//! The layer formats each event into one buffer and writes it in a single
//! call, so records never interleave in the file.

use std::io::{self, Write};
use std::sync::Arc;

use tracing_subscriber::fmt::MakeWriter;

use super::file_writer::FileWriter;

/// A handle onto a shared [`FileWriter`], produced per event
#[derive(Debug, Clone)]
pub struct SharedFileWriter {
    writer: Arc<FileWriter>,
}

impl Write for SharedFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().map_err(Into::into)
    }
}

/// Writer factory for tracing-subscriber
#[derive(Debug, Clone)]
pub struct FileWriterMaker {
    writer: Arc<FileWriter>,
}

impl FileWriterMaker {
    pub fn new(writer: Arc<FileWriter>) -> Self {
        Self { writer }
    }

    /// The writer records are sent to
    pub fn writer(&self) -> &Arc<FileWriter> {
        &self.writer
    }
}

impl<'a> MakeWriter<'a> for FileWriterMaker {
    type Writer = SharedFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileWriter {
            writer: Arc::clone(&self.writer),
        }
    }
}
