//! Addressable configuration keys (`section.key`).

use std::str::FromStr;

use super::file::{ConfigError, ConfigFile};

/// One setting in `config.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigKey {
    section: String,
    key: String,
}

impl ConfigKey {
    /// Every known key, in file order.
    pub fn all() -> Vec<ConfigKey> {
        let ini = ConfigFile::default().to_ini();
        ini.iter()
            .filter_map(|(section, props)| section.map(|s| (s, props)))
            .flat_map(|(section, props)| {
                props.iter().map(move |(key, _)| ConfigKey {
                    section: section.to_string(),
                    key: key.to_string(),
                })
            })
            .collect()
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn key_name(&self) -> &str {
        &self.key
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section, self.key)
    }

    /// Current value as written in the file; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        config
            .to_ini()
            .get_from(Some(self.section.as_str()), &self.key)
            .unwrap_or_default()
            .to_string()
    }

    /// Set a value, validating the resulting configuration.
    ///
    /// `config` is left unchanged when the value is rejected.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let mut ini = config.to_ini();
        ini.set_to(Some(self.section.as_str()), self.key.clone(), value.trim().to_string());

        // A new level replaces the tolerances derived from the old one
        if self.section == "preferences" && self.key == "level" {
            for key in ["comfort_band", "confidence_threshold", "probe_drift"] {
                ini.delete_from(Some("preferences"), key);
            }
        }

        *config = ConfigFile::from_ini(&ini)?;
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|key| key.name() == s.trim())
            .ok_or_else(|| ConfigError::Invalid(format!("unknown configuration key '{}'", s)))
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.section, self.key)
    }
}
