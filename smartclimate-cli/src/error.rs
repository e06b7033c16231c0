//! CLI error type.

use std::fmt;
use std::path::PathBuf;

use smartclimate::config::ConfigError;
use smartclimate::controller::ControllerError;
use smartclimate::persistence::PersistenceError;
use smartclimate::thermal::ThermalError;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Invalid arguments or settings.
    Config(String),
    /// Loading or saving the config file failed.
    ConfigFile(ConfigError),
    /// Reading or writing device records failed.
    Persistence(PersistenceError),
    /// Thermal parameters were rejected.
    Thermal(ThermalError),
    /// The controller failed outside a tick.
    Controller(ControllerError),
    /// No record exists for the device.
    RecordNotFound { device: String, dir: PathBuf },
    /// The async runtime could not be started.
    Runtime(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "Config file error: {}", e),
            CliError::Persistence(e) => write!(f, "Storage error: {}", e),
            CliError::Thermal(e) => write!(f, "Thermal model error: {}", e),
            CliError::Controller(e) => write!(f, "Controller error: {}", e),
            CliError::RecordNotFound { device, dir } => {
                write!(f, "No record for device '{}' in {}", device, dir.display())
            }
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Persistence(e) => Some(e),
            CliError::Thermal(e) => Some(e),
            CliError::Controller(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Config(_) | CliError::RecordNotFound { .. } => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<PersistenceError> for CliError {
    fn from(e: PersistenceError) -> Self {
        CliError::Persistence(e)
    }
}

impl From<ThermalError> for CliError {
    fn from(e: ThermalError) -> Self {
        CliError::Thermal(e)
    }
}

impl From<ControllerError> for CliError {
    fn from(e: ControllerError) -> Self {
        CliError::Controller(e)
    }
}
