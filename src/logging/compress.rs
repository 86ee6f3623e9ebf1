//! Background gzip compression of archived log files
//!
//! Each archive is compressed on its own thread. The [`Compressor`] counts
//! reserved compressions and keeps the join handles, so that closing the
//! writer can wait for every in-flight compression before it returns.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use flate2::write::GzEncoder;
use flate2::Compression;

use super::error::{Result, WriterError};
use super::file_writer::log_file_options;
use super::naming::{compressed_path, processing_path};

const COMPRESS_THREAD_NAME: &str = "rotalog-compress";

/// Outcome of a successful compression
#[derive(Debug, Clone)]
pub struct CompressedFile {
    /// Path of the `.gz` artifact
    pub path: PathBuf,
    /// Size of the uncompressed archive in bytes
    pub original_size: u64,
}

/// Compress `archive` into `<archive>.gz` and remove the original
///
/// Output is written to `<archive>.gz.processing` and renamed into place only
/// once the gzip stream is complete. On failure the partial output is removed
/// and the original archive is left untouched.
pub fn compress_file(archive: &Path) -> Result<CompressedFile> {
    let temp_path = processing_path(archive);
    let target = compressed_path(archive);

    let original_size = match write_gzip(archive, &temp_path).and_then(|size| {
        fs::rename(&temp_path, &target)
            .map(|_| size)
            .map_err(|e| WriterError::io("Failed to rename compressed output", &temp_path, e))
    }) {
        Ok(size) => size,
        Err(err) => {
            if let Err(e) = fs::remove_file(&temp_path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(
                        "Failed to remove partial output {}: {}",
                        temp_path.display(),
                        e
                    );
                }
            }
            return Err(err);
        }
    };

    fs::remove_file(archive)
        .map_err(|e| WriterError::io("Failed to remove compressed archive", archive, e))?;

    Ok(CompressedFile {
        path: target,
        original_size,
    })
}

fn write_gzip(input_path: &Path, output_path: &Path) -> Result<u64> {
    let input = File::open(input_path)
        .map_err(|e| WriterError::io("Failed to open archive for compression", input_path, e))?;

    let output = log_file_options()
        .write(true)
        .create(true)
        .truncate(true)
        .open(output_path)
        .map_err(|e| WriterError::io("Failed to create compressed output", output_path, e))?;

    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    let size = io::copy(&mut BufReader::new(input), &mut encoder)
        .map_err(|e| WriterError::io("Failed to compress", input_path, e))?;

    encoder
        .finish()
        .and_then(|writer| writer.into_inner().map_err(|e| e.into_error()))
        .map_err(|e| WriterError::io("Failed to finish compressed output", output_path, e))?;

    Ok(size)
}

/// Compress one archive and log the outcome; failures are never retried
fn run_compression(archive: &Path) {
    match compress_file(archive) {
        Ok(compressed) => tracing::info!(
            "Compressed {} ({} bytes)",
            compressed.path.display(),
            compressed.original_size
        ),
        Err(e) => tracing::warn!("Failed to compress {}: {}", archive.display(), e),
    }
}

#[derive(Debug, Default)]
struct CompressorState {
    handles: Vec<JoinHandle<()>>,
    /// Reserved compressions whose task has not been started yet
    reserved: usize,
    shut_down: bool,
}

/// Tracks background compression tasks so they can be drained
#[derive(Debug, Default)]
pub struct Compressor {
    state: Mutex<CompressorState>,
    released: Condvar,
}

/// A compression that [`Compressor::shutdown`] already waits for
///
/// Reserving takes no locks besides the compressor's own and never logs, so
/// it is safe while the writer's state lock is held. The task starts on
/// [`start`](Self::start), or when the reservation is dropped.
#[derive(Debug)]
pub struct PendingCompression<'a> {
    compressor: &'a Compressor,
    archive: Option<PathBuf>,
}

impl PendingCompression<'_> {
    /// Start compressing the reserved archive
    pub fn start(mut self) {
        if let Some(archive) = self.archive.take() {
            self.compressor.launch(archive);
        }
    }
}

impl Drop for PendingCompression<'_> {
    fn drop(&mut self) {
        if let Some(archive) = self.archive.take() {
            self.compressor.launch(archive);
        }
    }
}

impl Compressor {
    /// Create an idle compressor
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CompressorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count `archive` as in flight without starting any work yet
    pub fn reserve(&self, archive: PathBuf) -> PendingCompression<'_> {
        self.lock().reserved += 1;
        PendingCompression {
            compressor: self,
            archive: Some(archive),
        }
    }

    /// Compress `archive` on a background thread
    ///
    /// After [`shutdown`](Self::shutdown), or if no thread can be spawned, the
    /// archive is compressed on the calling thread instead.
    pub fn schedule(&self, archive: PathBuf) {
        self.reserve(archive).start();
    }

    fn release(&self, mut state: MutexGuard<'_, CompressorState>) {
        state.reserved -= 1;
        drop(state);
        self.released.notify_all();
    }

    fn launch(&self, archive: PathBuf) {
        let mut state = self.lock();
        if state.shut_down {
            self.release(state);
            run_compression(&archive);
            return;
        }

        state.handles.retain(|handle| !handle.is_finished());

        let task_path = archive.clone();
        match thread::Builder::new()
            .name(COMPRESS_THREAD_NAME.to_string())
            .spawn(move || run_compression(&task_path))
        {
            Ok(handle) => {
                state.handles.push(handle);
                self.release(state);
            }
            Err(e) => {
                // The reservation is held until the inline run is done, so
                // shutdown keeps waiting for it.
                drop(state);
                tracing::warn!("Failed to spawn compression thread: {}", e);
                run_compression(&archive);
                self.release(self.lock());
            }
        }
    }

    /// Number of compressions reserved or running
    pub fn in_flight(&self) -> usize {
        let state = self.lock();
        state.reserved
            + state
                .handles
                .iter()
                .filter(|handle| !handle.is_finished())
                .count()
    }

    /// Wait for the compressions started so far
    pub fn wait_idle(&self) {
        let handles = std::mem::take(&mut self.lock().handles);
        join_all(handles);
    }

    /// Wait for every reserved and running compression, then run any later
    /// ones inline
    pub fn shutdown(&self) {
        let handles = {
            let mut state = self.lock();
            while state.reserved > 0 {
                state = self
                    .released
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            state.shut_down = true;
            std::mem::take(&mut state.handles)
        };
        join_all(handles);
    }
}

fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("Compression thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn read_gzip(path: &Path) -> String {
        let mut decoder = GzDecoder::new(File::open(path).unwrap());
        let mut content = String::new();
        decoder.read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_compress_file_replaces_archive() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("app-2026-01-21T14-30-45.000000.log");
        fs::write(&archive, "line one\nline two\n").unwrap();

        let compressed = compress_file(&archive).unwrap();

        assert_eq!(compressed.path, compressed_path(&archive));
        assert_eq!(compressed.original_size, 18);
        assert!(!archive.exists());
        assert!(!processing_path(&archive).exists());
        assert_eq!(read_gzip(&compressed.path), "line one\nline two\n");
    }

    #[test]
    fn test_compress_missing_archive_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("app-2026-01-21T14-30-45.000000.log");

        let err = compress_file(&archive).unwrap_err();

        assert!(matches!(err, WriterError::Io { .. }));
        assert!(!processing_path(&archive).exists());
        assert!(!compressed_path(&archive).exists());
    }

    #[test]
    fn test_failed_rename_keeps_original_and_removes_temp() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("app-2026-01-21T14-30-45.000000.log");
        fs::write(&archive, "keep me").unwrap();
        // A non-empty directory at the target path makes the rename fail
        let blocker = compressed_path(&archive);
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("occupied"), "x").unwrap();

        assert!(compress_file(&archive).is_err());

        assert_eq!(fs::read_to_string(&archive).unwrap(), "keep me");
        assert!(!processing_path(&archive).exists());
    }

    #[test]
    fn test_compressor_waits_for_scheduled_work() {
        let temp_dir = TempDir::new().unwrap();
        let compressor = Compressor::new();
        let mut archives = Vec::new();
        for i in 0..4 {
            let archive = temp_dir
                .path()
                .join(format!("app-2026-01-21T14-30-4{}.000000.log", i));
            fs::write(&archive, format!("archive {}", i)).unwrap();
            compressor.schedule(archive.clone());
            archives.push(archive);
        }

        compressor.wait_idle();

        assert_eq!(compressor.in_flight(), 0);
        for (i, archive) in archives.iter().enumerate() {
            assert!(!archive.exists());
            assert_eq!(read_gzip(&compressed_path(archive)), format!("archive {}", i));
        }
    }

    #[test]
    fn test_shutdown_waits_for_reserved_compression() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("app-2026-01-21T14-30-45.000000.log");
        fs::write(&archive, "reserved").unwrap();
        let compressor = Compressor::new();
        let shut_down = AtomicBool::new(false);

        let pending = compressor.reserve(archive.clone());
        assert_eq!(compressor.in_flight(), 1);

        thread::scope(|s| {
            s.spawn(|| {
                compressor.shutdown();
                shut_down.store(true, Ordering::SeqCst);
            });

            thread::sleep(Duration::from_millis(100));
            assert!(!shut_down.load(Ordering::SeqCst));
            pending.start();
        });

        assert!(shut_down.load(Ordering::SeqCst));
        assert!(!archive.exists());
        assert_eq!(read_gzip(&compressed_path(&archive)), "reserved");
        assert_eq!(compressor.in_flight(), 0);
    }

    #[test]
    fn test_dropped_reservation_still_compresses() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("app-2026-01-21T14-30-45.000000.log");
        fs::write(&archive, "dropped").unwrap();
        let compressor = Compressor::new();

        drop(compressor.reserve(archive.clone()));
        compressor.shutdown();

        assert!(!archive.exists());
        assert!(compressed_path(&archive).exists());
    }

    #[test]
    fn test_schedule_after_shutdown_runs_inline() {
        let temp_dir = TempDir::new().unwrap();
        let compressor = Compressor::new();
        compressor.shutdown();

        let archive = temp_dir.path().join("app-2026-01-21T14-30-45.000000.log");
        fs::write(&archive, "late").unwrap();
        compressor.schedule(archive.clone());

        // No waiting: the work already happened on this thread
        assert!(!archive.exists());
        assert!(compressed_path(&archive).exists());
    }
}
