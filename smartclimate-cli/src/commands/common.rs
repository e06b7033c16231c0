//! Common types and utilities shared across CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use clap::ValueEnum;
use smartclimate::config::{ConfigFile, StorageBackend};
use smartclimate::persistence::{FileStorage, MemoryStorage, Storage};
use smartclimate::thermal::{PreferenceLevel, UserPreferences};

/// Comfort preference selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum PreferenceArg {
    /// Tightest comfort band
    MaxComfort,
    /// Comfort first, some drift allowed
    Comfort,
    /// Default trade-off
    Balanced,
    /// Savings first, wider band
    Savings,
    /// Widest band
    MaxSavings,
}

impl From<PreferenceArg> for PreferenceLevel {
    fn from(arg: PreferenceArg) -> Self {
        match arg {
            PreferenceArg::MaxComfort => PreferenceLevel::MaxComfort,
            PreferenceArg::Comfort => PreferenceLevel::ComfortPriority,
            PreferenceArg::Balanced => PreferenceLevel::Balanced,
            PreferenceArg::Savings => PreferenceLevel::SavingsPriority,
            PreferenceArg::MaxSavings => PreferenceLevel::MaxSavings,
        }
    }
}

/// Record storage selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum StorageArg {
    /// One JSON file per device
    File,
    /// In memory only, discarded on exit
    Memory,
}

impl From<StorageArg> for StorageBackend {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::File => StorageBackend::File,
            StorageArg::Memory => StorageBackend::Memory,
        }
    }
}

/// Resolve preferences from CLI args and config.
pub fn resolve_preferences(cli: Option<PreferenceArg>, config: &ConfigFile) -> UserPreferences {
    // CLI takes precedence, then config
    match cli {
        Some(arg) => UserPreferences::for_level(arg.into()),
        None => config.preferences(),
    }
}

/// Storage picked by CLI args or config, with a description for the banner.
pub fn resolve_storage(
    cli_backend: Option<StorageArg>,
    cli_dir: Option<PathBuf>,
    config: &ConfigFile,
) -> (Arc<dyn Storage>, String) {
    let backend = cli_backend.map(StorageBackend::from).unwrap_or(config.storage.backend);
    match backend {
        StorageBackend::Memory => (Arc::new(MemoryStorage::new()), "memory".to_string()),
        StorageBackend::File => {
            let dir = cli_dir.unwrap_or_else(|| config.storage.resolved_directory());
            let description = format!("file ({})", dir.display());
            (Arc::new(FileStorage::new(dir)), description)
        }
    }
}
