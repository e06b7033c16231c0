//! Configuration management CLI commands.
//!
//! Provides `config get`, `config set`, `config show`, and `config path`
//! for viewing and modifying settings from the command line.

use std::path::Path;

use clap::Subcommand;
use smartclimate::config::{ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., thermal.calibration_hour)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in format section.key (e.g., thermal.calibration_hour)
        key: String,

        /// Value to set
        value: String,
    },

    /// Show all configuration settings
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand against the file at `path`.
pub fn run(command: ConfigCommands, path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key, path),
        ConfigCommands::Set { key, value } => run_set(&key, &value, path),
        ConfigCommands::Show => run_show(path),
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'smartclimate config show' to see available keys.",
            key
        ))
    })
}

fn run_get(key: &str, path: &Path) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let config = ConfigFile::load_from(path)?;
    let value = config_key.get(&config);

    if value.is_empty() {
        println!("(not set)");
    } else {
        println!("{}", value);
    }
    Ok(())
}

fn run_set(key: &str, value: &str, path: &Path) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let mut config = ConfigFile::load_from(path)?;
    config_key.set(&mut config, value)?;
    config.save_to(path)?;

    println!("Set {} = {}", config_key.name(), value);
    Ok(())
}

fn run_show(path: &Path) -> Result<(), CliError> {
    let config = ConfigFile::load_from(path)?;

    println!("Configuration Settings");
    println!("======================");
    println!();

    let mut current_section = String::new();
    for key in ConfigKey::all() {
        if key.section() != current_section {
            if !current_section.is_empty() {
                println!();
            }
            println!("[{}]", key.section());
            current_section = key.section().to_string();
        }

        let value = key.get(&config);
        if value.is_empty() {
            println!("  {} = (not set)", key.key_name());
        } else {
            println!("  {} = {}", key.key_name(), value);
        }
    }
    Ok(())
}
