use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use rotalog::config::{Config, LoggerMode, LoggingConfig};
use rotalog::logging::{self, FileWriter, WriterError};

/// Copy stdin into a size-rotating, compressed, retention-managed log file
///
/// Settings come from the config file, then ROTALOG_* environment variables,
/// then the flags below. Diagnostics go to stderr.
#[derive(Debug, Parser)]
#[command(name = "rotalog", version)]
struct Args {
    /// Config file (default: <config dir>/rotalog/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for log files
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Active log file name
    #[arg(long)]
    file: Option<String>,

    /// Rotate once the active file exceeds this many megabytes
    #[arg(long)]
    max_size_mb: Option<u64>,

    /// Delete log files older than this many days at startup (0 keeps them)
    #[arg(long)]
    max_age_days: Option<u64>,

    /// Leave rotated files uncompressed
    #[arg(long)]
    no_compress: bool,
}

impl Args {
    fn apply(&self, logging: &mut LoggingConfig) {
        if let Some(dir) = &self.dir {
            logging.directory = dir.clone();
        }
        if let Some(file) = &self.file {
            logging.file_name = file.clone();
        }
        if let Some(size) = self.max_size_mb {
            logging.max_size_mb = size;
        }
        if let Some(days) = self.max_age_days {
            logging.max_age_days = days;
        }
        if self.no_compress {
            logging.compress = false;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.logging.apply_env();
    args.apply(&mut config.logging);

    // Diagnostics BEFORE anything that may log
    let _guard = logging::init_logging(&diagnostics_config(&config.logging))?;
    if config.logging.mode.uses_file() {
        tracing::warn!(
            "Logger mode '{:?}' would write diagnostics into the piped log file; using stderr",
            config.logging.mode
        );
    }

    let writer =
        FileWriter::new(config.logging.writer_config()).context("Failed to open log file")?;
    tracing::info!("Logging to: {}", writer.active_path().display());

    let lines = pipe_lines(io::stdin().lock(), &writer)?;

    writer.close().context("Failed to close log file")?;
    tracing::info!("Wrote {} lines", lines);
    Ok(())
}

/// Diagnostics settings for the CLI
///
/// The rotating file carries stdin, so diagnostics stay on stderr: file
/// modes fall back to console, while the level and container mode are kept.
fn diagnostics_config(logging: &LoggingConfig) -> LoggingConfig {
    let mode = match logging.mode {
        LoggerMode::Container => LoggerMode::Container,
        _ => LoggerMode::Console,
    };
    LoggingConfig {
        mode,
        ..logging.clone()
    }
}

/// Write every line of `input` to `writer`, returning the number of lines
fn pipe_lines(mut input: impl BufRead, writer: &FileWriter) -> Result<u64> {
    let mut line = Vec::new();
    let mut count = 0;

    loop {
        line.clear();
        let read = input
            .read_until(b'\n', &mut line)
            .context("Failed to read stdin")?;
        if read == 0 {
            return Ok(count);
        }
        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }

        match writer.write(&line) {
            Ok(_) => count += 1,
            Err(e @ WriterError::Rotate { .. }) => {
                // The line is in the file; only the rotation failed
                count += 1;
                tracing::warn!("{}", e);
            }
            Err(WriterError::Closed) => return Ok(count),
            Err(e) => tracing::error!("Dropped line: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotalog::WriterConfig;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_pipe_lines_terminates_last_line() {
        let temp_dir = TempDir::new().unwrap();
        let writer = FileWriter::new(WriterConfig::new(temp_dir.path(), "app.log")).unwrap();

        let count = pipe_lines(&b"first\nsecond\nthird"[..], &writer).unwrap();
        writer.close().unwrap();

        assert_eq!(count, 3);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("app.log")).unwrap(),
            "first\nsecond\nthird\n"
        );
    }

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "rotalog",
            "--dir",
            "/srv/logs",
            "--max-size-mb",
            "8",
            "--no-compress",
        ]);
        let mut logging = LoggingConfig::default();
        args.apply(&mut logging);

        assert_eq!(logging.directory, PathBuf::from("/srv/logs"));
        assert_eq!(logging.max_size_mb, 8);
        assert!(!logging.compress);
        assert_eq!(logging.file_name, "log.log");
    }

    #[test]
    fn test_diagnostics_stay_off_the_piped_file() {
        for (mode, expected) in [
            (LoggerMode::Console, LoggerMode::Console),
            (LoggerMode::File, LoggerMode::Console),
            (LoggerMode::Both, LoggerMode::Console),
            (LoggerMode::Container, LoggerMode::Container),
        ] {
            let logging = LoggingConfig {
                mode,
                level: "debug".to_string(),
                ..LoggingConfig::default()
            };

            let diagnostics = diagnostics_config(&logging);

            assert_eq!(diagnostics.mode, expected);
            assert_eq!(diagnostics.level, "debug");
            assert!(!diagnostics.mode.uses_file());
        }
    }
}
