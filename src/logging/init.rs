//! Process-wide logging setup
//!
//! Builds a tracing subscriber for one of the [`LoggerMode`]s. File modes
//! write JSON records through a rotating [`FileWriter`].

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LoggerMode, LoggingConfig};

use super::file_writer::FileWriter;
use super::sink::FileWriterMaker;

/// Keeps the rotating file writer alive; closes it on drop
#[derive(Debug)]
pub struct LoggingGuard {
    writer: Option<Arc<FileWriter>>,
}

impl LoggingGuard {
    /// The file writer behind the subscriber, if the mode uses one
    pub fn writer(&self) -> Option<&Arc<FileWriter>> {
        self.writer.as_ref()
    }

    /// Close the file writer, waiting for background compression
    pub fn close(mut self) -> Result<()> {
        match self.writer.take() {
            Some(writer) => writer.close().context("Failed to close log file"),
            None => Ok(()),
        }
    }
}

impl Drop for LoggingGuard {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.close() {
                tracing::warn!("Failed to close log file: {}", e);
            }
        }
    }
}

/// Build the subscriber for `config` without installing it
///
/// `RUST_LOG` takes precedence over `config.level`.
pub fn build_subscriber(
    config: &LoggingConfig,
) -> Result<(impl tracing::Subscriber + Send + Sync, LoggingGuard)> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    let writer = if config.mode.uses_file() {
        let writer = FileWriter::new(config.writer_config()).context("Failed to open log file")?;
        Some(Arc::new(writer))
    } else {
        None
    };

    let file_layer = writer.as_ref().map(|writer| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(FileWriterMaker::new(Arc::clone(writer)))
            .with_ansi(false)
            .with_target(true)
    });

    let console_layer = matches!(config.mode, LoggerMode::Console | LoggerMode::Both).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
    });

    let container_layer = matches!(config.mode, LoggerMode::Container).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_ansi(false)
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .with(container_layer);

    Ok((subscriber, LoggingGuard { writer }))
}

/// Initialize process logging
///
/// Returns a guard that must be kept alive for the duration of logging.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard> {
    let (subscriber, guard) = build_subscriber(config)?;
    subscriber
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(guard)
}
