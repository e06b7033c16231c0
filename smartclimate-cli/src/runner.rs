//! Shared command setup: configuration and logging.

use std::path::{Path, PathBuf};

use smartclimate::config::{config_file_path, ConfigFile};
use smartclimate::logging::{init_logging, WorkerGuard};

use crate::error::CliError;

/// Loaded configuration plus the logging guard for one CLI invocation.
pub struct CliRunner {
    config: ConfigFile,
    config_path: PathBuf,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Load configuration from `config_path` (or the default location) and
    /// install logging.
    pub fn new(config_path: Option<&Path>, verbose: bool) -> Result<Self, CliError> {
        let config_path = config_path.map(Path::to_path_buf).unwrap_or_else(config_file_path);
        let config = ConfigFile::load_from(&config_path)?;

        let mut logging = config.logging.clone();
        if verbose {
            logging.level = "debug".to_string();
        }
        let log_guard = init_logging(&logging);

        Ok(Self {
            config,
            config_path,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        tracing::info!(
            version = smartclimate::VERSION,
            command,
            config = %self.config_path.display(),
            "SmartClimate starting"
        );
    }
}
