//! Structured logging setup.
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - JSON output for log shippers, pretty output for development
//! - With a log directory, every event also goes to `combined.log` and
//!   errors to `error.log`, both as JSON through non-blocking writers
//! - Alerting is an extra layer on the same registry, not a side effect
//!   of the logging macros

use std::path::Path;

use thiserror::Error;
use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::{LogFormat, ObservabilityConfig};
use crate::observability::alert::AlertLayer;

pub const COMBINED_LOG: &str = "combined.log";
pub const ERROR_LOG: &str = "error.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    Filter(#[from] ParseError),
    #[error("cannot open log file: {0}")]
    File(#[from] InitError),
    #[error("logging already initialized: {0}")]
    Init(#[from] TryInitError),
}

/// Flushes the log files when dropped. Hold it until the process exits.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LogGuard {
    _workers: Vec<WorkerGuard>,
}

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig, alerts: Option<AlertLayer>) -> Result<LogGuard, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)?,
    };

    let (json, pretty) = match config.log_format {
        LogFormat::Json => (Some(fmt::layer().json().with_current_span(false)), None),
        LogFormat::Pretty => (None, Some(fmt::layer().with_target(true))),
    };

    let (files, guard) = match &config.log_dir {
        Some(dir) => {
            let (layer, guard) = file_layer(Path::new(dir))?;
            (Some(layer), guard)
        }
        None => (None, LogGuard::default()),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .with(files)
        .with(alerts)
        .try_init()?;

    if let Some(dir) = &config.log_dir {
        tracing::info!(log_dir = %dir, "File logging enabled");
    }
    Ok(guard)
}

/// JSON layers writing every event to `combined.log` and errors to `error.log` under `dir`.
pub fn file_layer<S>(dir: &Path) -> Result<(impl Layer<S> + Send + Sync, LogGuard), LoggingError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let (combined, combined_guard) = tracing_appender::non_blocking(log_file(dir, COMBINED_LOG)?);
    let (errors, errors_guard) = tracing_appender::non_blocking(log_file(dir, ERROR_LOG)?);

    let layer = fmt::layer()
        .json()
        .with_current_span(false)
        .with_ansi(false)
        .with_writer(combined)
        .and_then(
            fmt::layer()
                .json()
                .with_current_span(false)
                .with_ansi(false)
                .with_writer(errors.with_max_level(Level::ERROR)),
        );

    Ok((layer, LogGuard { _workers: vec![combined_guard, errors_guard] }))
}

fn log_file(dir: &Path, name: &str) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn file_layer_splits_errors_out() {
        let dir = std::env::temp_dir().join(format!("rtc-gateway-logs-{}", uuid::Uuid::new_v4()));

        let (layer, guard) = file_layer(&dir).unwrap();
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(session_id = "sess-1", "Relay session open");
            tracing::error!(kind = "timeout", "Upstream unavailable");
        });
        drop(guard);

        let combined = fs::read_to_string(dir.join(COMBINED_LOG)).unwrap();
        assert_eq!(combined.lines().count(), 2);
        assert!(combined.contains("Relay session open"));
        assert!(combined.contains("\"session_id\":\"sess-1\""));

        let errors = fs::read_to_string(dir.join(ERROR_LOG)).unwrap();
        assert_eq!(errors.lines().count(), 1);
        assert!(errors.contains("Upstream unavailable"));
        assert!(!errors.contains("Relay session open"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unwritable_log_dir_is_an_error() {
        let file = std::env::temp_dir().join(format!("rtc-gateway-notadir-{}", uuid::Uuid::new_v4()));
        fs::write(&file, b"").unwrap();

        let result = file_layer::<tracing_subscriber::Registry>(&file.join("logs"));
        assert!(matches!(result, Err(LoggingError::File(_))));

        fs::remove_file(&file).unwrap();
    }
}
