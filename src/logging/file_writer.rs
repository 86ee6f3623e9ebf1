//! Rotating log file writer
//!
//! [`FileWriter`] appends byte records to an active file. Once the file grows
//! past the configured size it is renamed to a timestamped archive, a fresh
//! active file is opened, and the archive is gzipped in the background.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};

use crate::config::WriterConfig;

use super::compress::{Compressor, PendingCompression};
use super::error::{Result, WriterError};
use super::naming::next_archive_path;
use super::retention;

/// Permissions of created log directories (rwxr-xr-x)
pub const LOG_DIR_MODE: u32 = 0o755;

/// Permissions of created log files (rw-r--r--)
pub const LOG_FILE_MODE: u32 = 0o644;

/// Open options carrying the log file permissions
pub(crate) fn log_file_options() -> OpenOptions {
    #[allow(unused_mut)]
    let mut options = OpenOptions::new();
    #[cfg(unix)]
    options.mode(LOG_FILE_MODE);
    options
}

fn ensure_log_dir(dir: &Path) -> Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(LOG_DIR_MODE);
    builder
        .create(dir)
        .map_err(|e| WriterError::io("Failed to create log directory", dir, e))
}

fn open_log_file(path: &Path) -> Result<File> {
    log_file_options()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| WriterError::io("Failed to open log file", path, e))
}

/// Rename the active file to a fresh archive name
fn archive_active(active_path: &Path) -> Result<PathBuf> {
    let archive = next_archive_path(active_path);
    fs::rename(active_path, &archive)
        .map_err(|e| WriterError::io("Failed to archive log file", active_path, e))?;
    Ok(archive)
}

/// Mutable state shared by all writers, guarded by one lock
#[derive(Debug)]
struct WriterState {
    /// Open active file; `None` only after a failed rotation or after close
    file: Option<File>,
    /// Bytes in the active file since it was opened or last rotated
    bytes_written: u64,
    closed: bool,
}

/// Size-rotating, self-compressing log file writer
///
/// All methods take `&self`; concurrent writes are serialized and each
/// payload lands in the file contiguously. Share it behind an `Arc`.
#[derive(Debug)]
pub struct FileWriter {
    config: WriterConfig,
    active_path: PathBuf,
    state: Mutex<WriterState>,
    compressor: Compressor,
}

impl FileWriter {
    /// Create the writer: ensure the directory exists, sweep expired files,
    /// archive an oversized leftover active file, and open the active file
    /// for append.
    pub fn new(config: WriterConfig) -> Result<Self> {
        let config = config.normalized()?;
        let active_path = config.active_path();

        ensure_log_dir(&config.directory)?;

        let report = retention::sweep(&config)?;
        if report.removed > 0 {
            tracing::info!(
                "Removed {} expired log files from {}",
                report.removed,
                config.directory.display()
            );
        }

        let mut bytes_written = 0;
        let mut initial_archive = None;
        match fs::metadata(&active_path) {
            Ok(metadata) if metadata.len() >= config.max_size_bytes => {
                let archive = archive_active(&active_path)?;
                tracing::info!("Archived oversized log file to {}", archive.display());
                initial_archive = Some(archive);
            }
            Ok(metadata) => {
                bytes_written = metadata.len();
                tracing::debug!(
                    "Appending to {} ({} bytes)",
                    active_path.display(),
                    bytes_written
                );
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(WriterError::io(
                    "Failed to inspect log file",
                    &active_path,
                    e,
                ))
            }
        }

        let file = open_log_file(&active_path)?;

        let writer = Self {
            active_path,
            state: Mutex::new(WriterState {
                file: Some(file),
                bytes_written,
                closed: false,
            }),
            compressor: Compressor::new(),
            config,
        };

        if writer.config.compress {
            for archive in report.pending_compression.into_iter().chain(initial_archive) {
                writer.compressor.schedule(archive);
            }
        }

        Ok(writer)
    }

    fn lock_state(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `buf` to the active file, rotating it if it grew past the limit
    ///
    /// Returns the number of bytes written. A [`WriterError::Rotate`] means
    /// the bytes are in the file but the following rotation failed; the
    /// write must not be repeated.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        // No tracing events while the lock is held: this writer is usually
        // the sink of the subscriber that would receive them.
        let (pending, rotated) = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            if state.closed {
                return Err(WriterError::Closed);
            }

            let file = match state.file.take() {
                Some(file) => file,
                None => open_log_file(&self.active_path)?,
            };
            let file = state.file.insert(file);

            file.write_all(buf)
                .map_err(|e| WriterError::io("Failed to write log file", &self.active_path, e))?;
            state.bytes_written += buf.len() as u64;

            if state.bytes_written <= self.config.max_size_bytes {
                return Ok(buf.len());
            }

            self.rotate(state)
        };

        if let Some(pending) = pending {
            pending.start();
        }

        rotated
            .map(|()| buf.len())
            .map_err(|e| WriterError::Rotate {
                written: buf.len(),
                source: Box::new(e),
            })
    }

    /// Close the active file, archive it and open a new one.
    /// Must be called with the state lock held.
    fn rotate(&self, state: &mut WriterState) -> (Option<PendingCompression<'_>>, Result<()>) {
        self.rotate_with(state, open_log_file)
    }

    /// Rotation with the reopen step supplied by the caller
    ///
    /// Once the rename succeeds the archive is reserved for compression, so
    /// it is returned even when reopening the active file fails. The
    /// reservation keeps `close` waiting until the caller starts it.
    fn rotate_with(
        &self,
        state: &mut WriterState,
        open: impl FnOnce(&Path) -> Result<File>,
    ) -> (Option<PendingCompression<'_>>, Result<()>) {
        let Some(file) = state.file.take() else {
            panic!(
                "log file handle missing while rotating {}",
                self.active_path.display()
            );
        };
        drop(file);

        let archive = match ensure_log_dir(&self.config.directory)
            .and_then(|()| archive_active(&self.active_path))
        {
            Ok(archive) => archive,
            Err(e) => return (None, Err(e)),
        };
        state.bytes_written = 0;

        let pending = self
            .config
            .compress
            .then(|| self.compressor.reserve(archive));

        match open(&self.active_path) {
            Ok(file) => {
                state.file = Some(file);
                (pending, Ok(()))
            }
            Err(e) => (pending, Err(e)),
        }
    }

    /// Close the writer
    ///
    /// Later writes fail with [`WriterError::Closed`]. Blocks until every
    /// background compression has finished. Closing twice returns
    /// [`WriterError::Closed`] and changes nothing.
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            if state.closed {
                return Err(WriterError::Closed);
            }
            state.closed = true;
        }

        // Compression threads may log through this writer, so the state
        // lock must not be held while joining them.
        self.compressor.shutdown();

        let file = self.lock_state().file.take();
        if let Some(mut file) = file {
            file.flush()
                .map_err(|e| WriterError::io("Failed to flush log file", &self.active_path, e))?;
        }
        Ok(())
    }

    /// Flush the active file
    pub fn flush(&self) -> Result<()> {
        match self.lock_state().file.as_mut() {
            Some(file) => file
                .flush()
                .map_err(|e| WriterError::io("Failed to flush log file", &self.active_path, e)),
            None => Ok(()),
        }
    }

    /// Block until the compressions started so far have finished
    pub fn wait_for_compression(&self) {
        self.compressor.wait_idle();
    }

    /// Number of background compressions still running
    pub fn compressions_in_flight(&self) -> usize {
        self.compressor.in_flight()
    }

    /// Path of the active file
    pub fn active_path(&self) -> &Path {
        &self.active_path
    }

    /// Effective configuration, with defaults applied
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Bytes written to the current active file
    pub fn bytes_written(&self) -> u64 {
        self.lock_state().bytes_written
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }
}

impl Write for &FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FileWriter::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        FileWriter::flush(self).map_err(Into::into)
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FileWriter::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        FileWriter::flush(self).map_err(Into::into)
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                tracing::warn!("Failed to close log file {}: {}", self.active_path.display(), e);
            }
        }
    }
}
