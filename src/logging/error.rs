//! Error types for the rotating file writer

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`FileWriter`](super::FileWriter) and its housekeeping.
#[derive(Error, Debug)]
pub enum WriterError {
    /// The writer was closed; nothing was written
    #[error("file writer is closed")]
    Closed,

    /// A filesystem operation failed
    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The payload reached the active file but the rotation it triggered failed.
    ///
    /// `written` bytes are already persisted, so the write must not be retried.
    #[error("wrote {written} bytes but rotation failed: {source}")]
    Rotate {
        written: usize,
        #[source]
        source: Box<WriterError>,
    },

    /// Configuration cannot describe a usable log file
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl WriterError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        WriterError::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// Bytes that reached the active file despite the error
    pub fn bytes_written(&self) -> usize {
        match self {
            WriterError::Rotate { written, .. } => *written,
            _ => 0,
        }
    }
}

impl From<WriterError> for io::Error {
    fn from(err: WriterError) -> Self {
        let kind = match &err {
            WriterError::Closed => io::ErrorKind::BrokenPipe,
            WriterError::Io { source, .. } => source.kind(),
            WriterError::Rotate { .. } => io::ErrorKind::Other,
            WriterError::InvalidConfig(_) => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, err)
    }
}

pub type Result<T> = std::result::Result<T, WriterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_error_reports_written_bytes() {
        let err = WriterError::Rotate {
            written: 42,
            source: Box::new(WriterError::io(
                "Failed to rename",
                "/tmp/app.log",
                io::Error::from(io::ErrorKind::PermissionDenied),
            )),
        };
        assert_eq!(err.bytes_written(), 42);
        assert!(err.to_string().starts_with("wrote 42 bytes"));
        assert_eq!(WriterError::Closed.bytes_written(), 0);
    }

    #[test]
    fn test_closed_converts_to_broken_pipe() {
        let err: io::Error = WriterError::Closed.into();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_io_error_keeps_kind() {
        let err: io::Error = WriterError::io(
            "Failed to open",
            "/tmp/app.log",
            io::Error::from(io::ErrorKind::NotFound),
        )
        .into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("/tmp/app.log"));
    }
}
