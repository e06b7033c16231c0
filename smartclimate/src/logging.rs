//! Tracing subscriber setup.
//!
//! Installs a console layer and, when a log directory is configured, a
//! daily rolling file layer. `RUST_LOG` overrides the configured level.

use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub use tracing_appender::non_blocking::WorkerGuard;

/// Logging settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `smartclimate=debug`.
    pub level: String,

    /// Directory for rolling log files. Console only when `None`.
    pub directory: Option<PathBuf>,

    /// Log file name prefix.
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "smartclimate".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Filter from `RUST_LOG`, falling back to the configured level.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber.
///
/// Returns the file writer's guard, which must be kept alive for buffered
/// lines to be flushed. Calling this twice leaves the first subscriber in
/// place.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let console = fmt::layer().with_target(false);

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(console)
        .with(file_layer)
        .try_init();

    if let Err(e) = result {
        tracing::debug!(error = %e, "Logging already initialised");
    }
    guard
}
