//! Configuration management for rotalog
//!
//! [`WriterConfig`] holds the tunables of one [`FileWriter`](crate::logging::FileWriter).
//! It is read once when the writer is constructed. [`Config`] is the
//! application configuration loaded from `config.toml` and environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logging::WriterError;

/// Rotation threshold used when none is configured (bytes)
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 1_000_000;

/// Directory used when none is configured
pub const DEFAULT_LOG_DIR: &str = "./log";

/// Active file name used when none is configured
pub const DEFAULT_LOG_FILE_NAME: &str = "log.log";

/// Selects the logger output mode
pub const LOGGER_ENV_VAR: &str = "ROTALOG_LOGGER";

/// Overrides the log directory
pub const LOG_DIR_ENV_VAR: &str = "ROTALOG_LOG_DIR";

/// Overrides the rotation threshold, in megabytes
pub const LOG_FILE_SIZE_ENV_VAR: &str = "ROTALOG_LOG_FILE_SIZE_MB";

/// Overrides the retention window, in days
pub const LOG_FILE_MAX_AGE_ENV_VAR: &str = "ROTALOG_LOG_FILE_MAX_AGE_DAYS";

const SECS_PER_DAY: u64 = 24 * 60 * 60;
const BYTES_PER_MB: u64 = 1024 * 1024;

/// Tunables of a rotating file writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Directory holding the active file and its archives
    pub directory: PathBuf,
    /// Name of the active file inside `directory`
    pub file_name: String,
    /// Rotate once the active file grows past this many bytes (0 = default)
    pub max_size_bytes: u64,
    /// Delete files older than this at startup (zero = keep forever)
    pub retention: Duration,
    /// Gzip archives in the background
    pub compress: bool,
}

impl WriterConfig {
    /// Create a configuration with the default size threshold, no retention
    /// limit and compression enabled
    pub fn new(directory: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_name: file_name.into(),
            max_size_bytes: 0,
            retention: Duration::ZERO,
            compress: true,
        }
    }

    /// Specifies the rotation threshold in bytes.
    pub fn with_max_size_bytes(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    /// Specifies the retention window.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Enables or disables background compression.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Full path of the active file
    pub fn active_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    /// Fill in defaults and reject file names that are not plain names
    pub(crate) fn normalized(mut self) -> std::result::Result<Self, WriterError> {
        if self.max_size_bytes == 0 {
            self.max_size_bytes = DEFAULT_MAX_SIZE_BYTES;
        }
        if self.directory.as_os_str().is_empty() {
            self.directory = PathBuf::from(DEFAULT_LOG_DIR);
        }
        if self.file_name.is_empty() {
            self.file_name = DEFAULT_LOG_FILE_NAME.to_string();
        }

        let is_plain_name = Path::new(&self.file_name)
            .file_name()
            .is_some_and(|name| name == self.file_name.as_str());
        if !is_plain_name {
            return Err(WriterError::InvalidConfig(format!(
                "file name '{}' must not contain a directory",
                self.file_name
            )));
        }

        Ok(self)
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_DIR, DEFAULT_LOG_FILE_NAME)
    }
}

/// Where log records go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerMode {
    /// Human-readable records on stderr
    #[default]
    Console,
    /// JSON records into the rotating file only
    File,
    /// JSON records into the rotating file and human-readable records on stderr
    Both,
    /// JSON records on stderr
    Container,
}

impl LoggerMode {
    /// Whether this mode writes to the rotating file
    pub fn uses_file(&self) -> bool {
        matches!(self, LoggerMode::File | LoggerMode::Both)
    }
}

impl FromStr for LoggerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(LoggerMode::Console),
            "file" => Ok(LoggerMode::File),
            "both" => Ok(LoggerMode::Both),
            "container" => Ok(LoggerMode::Container),
            other => anyhow::bail!("Unknown logger mode '{}'", other),
        }
    }
}

/// Logging section of the application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output mode: "console" (default), "file", "both" or "container"
    #[serde(default)]
    pub mode: LoggerMode,

    /// Filter directive used when RUST_LOG is unset (default: "info")
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for log files (default: ./log)
    #[serde(default = "default_log_dir")]
    pub directory: PathBuf,

    /// Active log file name (default: log.log)
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Rotation threshold in megabytes; 0 uses the writer default of 1 MB
    #[serde(default)]
    pub max_size_mb: u64,

    /// Delete log files older than this many days; 0 keeps them forever
    #[serde(default)]
    pub max_age_days: u64,

    /// Gzip rotated files (default: true)
    #[serde(default = "default_compress")]
    pub compress: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}

fn default_file_name() -> String {
    DEFAULT_LOG_FILE_NAME.to_string()
}

fn default_compress() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            mode: LoggerMode::default(),
            level: default_level(),
            directory: default_log_dir(),
            file_name: default_file_name(),
            max_size_mb: 0,
            max_age_days: 0,
            compress: default_compress(),
        }
    }
}

impl LoggingConfig {
    /// Build the writer configuration described by this section
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig::new(&self.directory, &self.file_name)
            .with_max_size_bytes(self.max_size_mb.saturating_mul(BYTES_PER_MB))
            .with_retention(Duration::from_secs(
                self.max_age_days.saturating_mul(SECS_PER_DAY),
            ))
            .with_compress(self.compress)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides looked up by environment variable name
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(mode) = lookup(LOGGER_ENV_VAR) {
            match mode.parse() {
                Ok(mode) => self.mode = mode,
                Err(e) => tracing::warn!("Ignoring {}: {}", LOGGER_ENV_VAR, e),
            }
        }
        if let Some(dir) = lookup(LOG_DIR_ENV_VAR).filter(|d| !d.is_empty()) {
            self.directory = PathBuf::from(dir);
        }
        if let Some(size) = lookup(LOG_FILE_SIZE_ENV_VAR).and_then(|s| s.trim().parse().ok()) {
            self.max_size_mb = size;
        }
        if let Some(days) = lookup(LOG_FILE_MAX_AGE_ENV_VAR).and_then(|s| s.trim().parse().ok()) {
            self.max_age_days = days;
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging and file writer settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default file, or return default if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from `path`, or return default if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }
}

/// Get the base configuration directory (<config dir>/rotalog)
/// Falls back to ./.rotalog if the platform config directory cannot be determined
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("rotalog"))
        .unwrap_or_else(|| PathBuf::from(".rotalog"))
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_normalized_fills_defaults() {
        let config = WriterConfig::new("", "").normalized().unwrap();
        assert_eq!(config.max_size_bytes, DEFAULT_MAX_SIZE_BYTES);
        assert_eq!(config.directory, PathBuf::from(DEFAULT_LOG_DIR));
        assert_eq!(config.file_name, DEFAULT_LOG_FILE_NAME);
    }

    #[test]
    fn test_normalized_keeps_explicit_values() {
        let config = WriterConfig::new("/var/log/app", "app.log")
            .with_max_size_bytes(4096)
            .with_retention(Duration::from_secs(60))
            .with_compress(false)
            .normalized()
            .unwrap();
        assert_eq!(config.max_size_bytes, 4096);
        assert_eq!(config.retention, Duration::from_secs(60));
        assert!(!config.compress);
        assert_eq!(config.active_path(), PathBuf::from("/var/log/app/app.log"));
    }

    #[test]
    fn test_normalized_rejects_nested_file_name() {
        let err = WriterConfig::new("/tmp", "nested/app.log")
            .normalized()
            .unwrap_err();
        assert!(matches!(err, WriterError::InvalidConfig(_)));
        assert!(WriterConfig::new("/tmp", "..").normalized().is_err());
    }

    #[test]
    fn test_logger_mode_parse() {
        assert_eq!("file".parse::<LoggerMode>().unwrap(), LoggerMode::File);
        assert_eq!(" BOTH ".parse::<LoggerMode>().unwrap(), LoggerMode::Both);
        assert_eq!(
            "container".parse::<LoggerMode>().unwrap(),
            LoggerMode::Container
        );
        assert!("syslog".parse::<LoggerMode>().is_err());
        assert!(LoggerMode::Both.uses_file());
        assert!(!LoggerMode::Container.uses_file());
    }

    #[test]
    fn test_writer_config_from_logging_section() {
        let logging = LoggingConfig {
            max_size_mb: 2,
            max_age_days: 7,
            ..LoggingConfig::default()
        };
        let writer = logging.writer_config();
        assert_eq!(writer.max_size_bytes, 2 * 1024 * 1024);
        assert_eq!(writer.retention, Duration::from_secs(7 * 24 * 60 * 60));
        assert!(writer.compress);
    }

    #[test]
    fn test_default_logging_section_uses_writer_defaults() {
        let writer = LoggingConfig::default().writer_config();
        assert_eq!(writer.max_size_bytes, 0);
        assert_eq!(writer.retention, Duration::ZERO);
        assert_eq!(writer.normalized().unwrap().max_size_bytes, DEFAULT_MAX_SIZE_BYTES);
    }

    #[test]
    fn test_apply_overrides() {
        let env: HashMap<&str, &str> = [
            (LOGGER_ENV_VAR, "both"),
            (LOG_DIR_ENV_VAR, "/srv/logs"),
            (LOG_FILE_SIZE_ENV_VAR, "5"),
            (LOG_FILE_MAX_AGE_ENV_VAR, "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut logging = LoggingConfig {
            max_age_days: 3,
            ..LoggingConfig::default()
        };
        logging.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(logging.mode, LoggerMode::Both);
        assert_eq!(logging.directory, PathBuf::from("/srv/logs"));
        assert_eq!(logging.max_size_mb, 5);
        // Unparseable values leave the setting alone
        assert_eq!(logging.max_age_days, 3);
    }

    #[test]
    fn test_load_from_missing_file_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(config.logging.mode, LoggerMode::Console);
        assert_eq!(config.logging.file_name, DEFAULT_LOG_FILE_NAME);
    }

    #[test]
    fn test_load_from_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[logging]\nmode = \"file\"\nfile_name = \"app.log\"\nmax_size_mb = 10\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.logging.mode, LoggerMode::File);
        assert_eq!(config.logging.file_name, "app.log");
        assert_eq!(config.logging.max_size_mb, 10);
        assert!(config.logging.compress);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_invalid_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[logging]\nmode = \"syslog\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.logging.mode, config.logging.mode);
        assert_eq!(parsed.logging.directory, config.logging.directory);
    }

    #[test]
    fn test_config_dir_does_not_panic() {
        let dir = config_dir();
        assert!(dir.ends_with("rotalog") || dir.ends_with(".rotalog"));
    }
}
