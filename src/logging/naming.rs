//! On-disk naming of archived log files
//!
//! An active file `app.log` is archived as `app-2026-01-21T14-30-45.123456.log`,
//! compressed to `app-2026-01-21T14-30-45.123456.log.gz`, and while compression
//! runs the partial output is `app-2026-01-21T14-30-45.123456.log.gz.processing`.
//! Timestamps are UTC so archive names sort chronologically.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// Timestamp layout inserted between the file stem and its extension
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.6f";

/// Extension appended to compressed archives
pub const COMPRESSED_EXTENSION: &str = "gz";

/// Extension appended to compression output until it is complete
pub const PROCESSING_EXTENSION: &str = "processing";

/// What a directory entry is relative to one active file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// The active file itself
    Active,
    /// A rotated, not yet compressed archive
    Archive,
    /// A finished compressed archive
    Compressed,
    /// Partial compression output
    InProgress,
    /// Anything else in the directory
    Other,
}

fn split_name(file_name: &str) -> (&str, Option<&str>) {
    let path = Path::new(file_name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name);
    let ext = path.extension().and_then(|e| e.to_str());
    (stem, ext)
}

/// Archive file name for `active_name` at the given instant
pub fn archive_name(active_name: &str, at: DateTime<Utc>) -> String {
    let (stem, ext) = split_name(active_name);
    let timestamp = at.format(ARCHIVE_TIMESTAMP_FORMAT);
    match ext {
        Some(ext) => format!("{}-{}.{}", stem, timestamp, ext),
        None => format!("{}-{}", stem, timestamp),
    }
}

/// Pick a free archive path next to `active`, starting from the current time
///
/// Moves the timestamp forward by one microsecond while the candidate or one
/// of its compressed forms exists, so neither an archive nor its `.gz` is
/// ever replaced.
pub fn next_archive_path(active: &Path) -> PathBuf {
    let dir = active.parent().unwrap_or_else(|| Path::new("."));
    let active_name = active
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut at = Utc::now();
    loop {
        let candidate = dir.join(archive_name(&active_name, at));
        let taken = candidate.exists()
            || compressed_path(&candidate).exists()
            || processing_path(&candidate).exists();
        if !taken {
            return candidate;
        }
        at += Duration::microseconds(1);
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Final path of the compressed copy of `archive`
pub fn compressed_path(archive: &Path) -> PathBuf {
    with_suffix(archive, COMPRESSED_EXTENSION)
}

/// Temporary path written while `archive` is being compressed
pub fn processing_path(archive: &Path) -> PathBuf {
    with_suffix(&compressed_path(archive), PROCESSING_EXTENSION)
}

/// Parse the archive timestamp out of an archive name, if it is one
pub fn archive_timestamp(name: &str, active_name: &str) -> Option<DateTime<Utc>> {
    let (stem, ext) = split_name(active_name);
    let rest = name.strip_prefix(stem)?.strip_prefix('-')?;
    let timestamp = match ext {
        Some(ext) => rest.strip_suffix(ext)?.strip_suffix('.')?,
        None => rest,
    };
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H-%M-%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Classify a directory entry name against the active file name
pub fn classify(name: &str, active_name: &str) -> EntryKind {
    if name == active_name {
        return EntryKind::Active;
    }

    let processing_suffix = format!(".{}.{}", COMPRESSED_EXTENSION, PROCESSING_EXTENSION);
    if let Some(archive) = name.strip_suffix(&processing_suffix) {
        if archive_timestamp(archive, active_name).is_some() {
            return EntryKind::InProgress;
        }
        return EntryKind::Other;
    }

    let compressed_suffix = format!(".{}", COMPRESSED_EXTENSION);
    if let Some(archive) = name.strip_suffix(&compressed_suffix) {
        if archive_timestamp(archive, active_name).is_some() {
            return EntryKind::Compressed;
        }
        return EntryKind::Other;
    }

    if archive_timestamp(name, active_name).is_some() {
        EntryKind::Archive
    } else {
        EntryKind::Other
    }
}
