//! Log file retention management
//!
//! Runs once when a writer is constructed, before the active file is opened.
//! Deletes files older than the retention window and collects uncompressed
//! archives left behind by earlier runs.

use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::WriterConfig;

use super::error::{Result, WriterError};
use super::naming::{classify, EntryKind};

/// What a sweep did and what it left for the compressor
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Files removed because they outlived the retention window
    pub removed: usize,
    /// Partial compression outputs removed
    pub stale_outputs: usize,
    /// Uncompressed archives that still need compressing
    pub pending_compression: Vec<PathBuf>,
}

fn is_expired(metadata: &Metadata, now: SystemTime, retention: Duration) -> bool {
    if retention.is_zero() {
        return false;
    }
    metadata
        .modified()
        .ok()
        .and_then(|modified| now.duration_since(modified).ok())
        .is_some_and(|age| age > retention)
}

/// Sweep the log directory of `config`
///
/// Every regular file older than the retention window is deleted, whatever
/// its name; the directory is assumed to belong to this writer. Deletion
/// failures are logged and the sweep continues. Only failing to list the
/// directory is an error.
pub fn sweep(config: &WriterConfig) -> Result<SweepReport> {
    sweep_with(config, |path| fs::remove_file(path))
}

fn sweep_with(
    config: &WriterConfig,
    remove: impl Fn(&Path) -> io::Result<()>,
) -> Result<SweepReport> {
    let dir = &config.directory;
    let now = SystemTime::now();
    let mut report = SweepReport::default();

    let entries = fs::read_dir(dir)
        .map_err(|e| WriterError::io("Failed to read log directory", dir, e))?;

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Failed to read entry in {}: {}", dir.display(), e);
                continue;
            }
        };

        let metadata = match entry.metadata() {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => continue,
        };
        let path = entry.path();

        if is_expired(&metadata, now, config.retention) {
            match remove(path.as_path()) {
                Ok(()) => {
                    tracing::debug!("Removed expired log file {}", path.display());
                    report.removed += 1;
                }
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };

        match classify(&name, &config.file_name) {
            EntryKind::InProgress => match remove(path.as_path()) {
                Ok(()) => {
                    tracing::debug!("Removed partial compression output {}", path.display());
                    report.stale_outputs += 1;
                }
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            },
            EntryKind::Archive if config.compress => report.pending_compression.push(path),
            _ => {}
        }
    }

    report.pending_compression.sort();
    Ok(report)
}
