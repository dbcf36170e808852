//! Logging setup
//!
//! `RUST_LOG` takes precedence over the configured level. Output goes to
//! stderr unless a log file is configured.

use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter {filter:?}: {error}")]
    Filter { filter: String, error: String },

    #[error("Failed to open log file {path:?}: {error}")]
    File { path: String, error: String },

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

fn filter_for(level: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(level).map_err(|e| LoggingError::Filter {
        filter: level.to_string(),
        error: e.to_string(),
    })
}

/// Install the global tracing subscriber
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_for(&config.level)?,
    };

    let writer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| LoggingError::File {
                    path: path.clone(),
                    error: e.to_string(),
                })?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed(),
        "pretty" => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(writer)
            .boxed(),
        _ => tracing_subscriber::fmt::layer().with_writer(writer).boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!(level = %config.level, format = %config.format, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_parsing() {
        assert!(filter_for("info").is_ok());
        assert!(filter_for("usage_ledger=debug,warn").is_ok());
        assert!(matches!(
            filter_for("usage_ledger=loud"),
            Err(LoggingError::Filter { .. })
        ));
    }

    #[test]
    fn test_unwritable_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            file: Some(dir.path().join("missing").join("log.txt").to_string_lossy().into_owned()),
            ..LoggingConfig::default()
        };
        assert!(matches!(init(&config), Err(LoggingError::File { .. })));
    }
}
