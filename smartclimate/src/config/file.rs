use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::logging::LoggingConfig;
use crate::offset::OffsetConfig;
use crate::persistence::FileStorage;
use crate::thermal::{PreferenceLevel, ProbeConfig, ThermalConfig, UserPreferences};

/// Directory holding SmartClimate configuration.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smartclimate")
}

/// Default configuration file location.
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// Errors loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for {section}.{key}: {reason}")]
    Parse {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where device records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// One JSON file per device.
    #[default]
    File,
    /// Process memory only; nothing survives a restart.
    Memory,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::File => "file",
            StorageBackend::Memory => "memory",
        }
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(format!("expected 'file' or 'memory', got '{}'", other)),
        }
    }
}

/// Record storage settings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Record directory; the platform data directory when `None`.
    pub directory: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(FileStorage::default_dir)
    }
}

/// Complete configuration as stored in `config.ini`.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub thermal: ThermalConfig,
    pub offset: OffsetConfig,
    pub preferences: UserPreferences,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`, returning defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut contents = b"# SmartClimate configuration\n# Durations are in seconds; empty values use defaults.\n\n".to_vec();
        self.to_ini().write_to(&mut contents).map_err(write_err)?;
        std::fs::write(path, contents).map_err(write_err)?;

        tracing::debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    pub fn thermal_config(&self) -> ThermalConfig {
        self.thermal.clone()
    }

    pub fn probe_config(&self) -> ProbeConfig {
        self.thermal.probe.clone()
    }

    pub fn offset_config(&self) -> OffsetConfig {
        self.offset.clone()
    }

    pub fn preferences(&self) -> UserPreferences {
        self.preferences
    }

    /// Parse and validate settings from an INI document.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let p = Section::new(ini, "probe");
        let d = &defaults.thermal.probe;
        let probe = ProbeConfig {
            window: p.secs("window_secs", d.window)?,
            max_duration: p.secs("max_duration_secs", d.max_duration)?,
            min_samples: p.parse("min_samples", d.min_samples)?,
            target_samples: p.parse("target_samples", d.target_samples)?,
            min_baseline_samples: p.parse("min_baseline_samples", d.min_baseline_samples)?,
            baseline_tolerance: p.number("baseline_tolerance", d.baseline_tolerance)?,
            min_gradient: p.number("min_gradient", d.min_gradient)?,
            max_fit_error: p.number("max_fit_error", d.max_fit_error)?,
            blend_rate: p.number("blend_rate", d.blend_rate)?,
            history_size: p.parse("history_size", d.history_size)?,
        };

        let t = Section::new(ini, "thermal");
        let d = &defaults.thermal;
        let thermal = ThermalConfig {
            evaluation_interval: t.secs("evaluation_interval_secs", d.evaluation_interval)?,
            priming_duration: t.secs("priming_duration_secs", d.priming_duration)?,
            critical_deviation: t.number("critical_deviation", d.critical_deviation)?,
            inner_band_ratio: t.number("inner_band_ratio", d.inner_band_ratio)?,
            min_dwell: t.secs("min_dwell_secs", d.min_dwell)?,
            calibration_hour: t.parse("calibration_hour", d.calibration_hour)?,
            min_probe_interval: t.secs("min_probe_interval_secs", d.min_probe_interval)?,
            prepare_timeout: t.secs("prepare_timeout_secs", d.prepare_timeout)?,
            stale_after: t.secs("stale_after_secs", d.stale_after)?,
            correction_gain: t.number("correction_gain", d.correction_gain)?,
            max_correction_bias: t.number("max_correction_bias", d.max_correction_bias)?,
            baseline_window: t.parse("baseline_window", d.baseline_window)?,
            default_tau_cooling: t.number("default_tau_cooling", d.default_tau_cooling)?,
            default_tau_warming: t.number("default_tau_warming", d.default_tau_warming)?,
            confidence_half_life: t.secs("confidence_half_life_secs", d.confidence_half_life)?,
            probe,
        };

        let o = Section::new(ini, "offset");
        let d = &defaults.offset;
        let offset = OffsetConfig {
            max_offset: o.number("max_offset", d.max_offset)?,
            history_size: o.parse("history_size", d.history_size)?,
            smoothing: o.number("smoothing", d.smoothing)?,
            min_bucket_samples: o.parse("min_bucket_samples", d.min_bucket_samples)?,
            hour_weight: o.number("hour_weight", d.hour_weight)?,
            min_regression_samples: o.parse("min_regression_samples", d.min_regression_samples)?,
            min_outdoor_spread: o.number("min_outdoor_spread", d.min_outdoor_spread)?,
            target_samples: o.parse("target_samples", d.target_samples)?,
            learning_enabled: o.flag("learning_enabled", d.learning_enabled)?,
        };

        let preferences = parse_preferences(&Section::new(ini, "preferences"))?;

        let s = Section::new(ini, "storage");
        let storage = StorageConfig {
            backend: s.parse("backend", defaults.storage.backend)?,
            directory: s.raw("directory").map(PathBuf::from),
        };

        let l = Section::new(ini, "logging");
        let logging = LoggingConfig {
            level: l.raw("level").map(str::to_string).unwrap_or(defaults.logging.level),
            directory: l.raw("directory").map(PathBuf::from),
            file_prefix: l
                .raw("file_prefix")
                .map(str::to_string)
                .unwrap_or(defaults.logging.file_prefix),
        };

        let config = Self {
            thermal,
            offset,
            preferences,
            storage,
            logging,
        };
        config.validate()?;
        Ok(config)
    }

    /// Render as an INI document.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        let t = &self.thermal;
        ini.with_section(Some("thermal"))
            .set("evaluation_interval_secs", secs(t.evaluation_interval))
            .set("priming_duration_secs", secs(t.priming_duration))
            .set("critical_deviation", t.critical_deviation.to_string())
            .set("inner_band_ratio", t.inner_band_ratio.to_string())
            .set("min_dwell_secs", secs(t.min_dwell))
            .set("calibration_hour", t.calibration_hour.to_string())
            .set("min_probe_interval_secs", secs(t.min_probe_interval))
            .set("prepare_timeout_secs", secs(t.prepare_timeout))
            .set("stale_after_secs", secs(t.stale_after))
            .set("correction_gain", t.correction_gain.to_string())
            .set("max_correction_bias", t.max_correction_bias.to_string())
            .set("baseline_window", t.baseline_window.to_string())
            .set("default_tau_cooling", t.default_tau_cooling.to_string())
            .set("default_tau_warming", t.default_tau_warming.to_string())
            .set("confidence_half_life_secs", secs(t.confidence_half_life));

        let p = &self.thermal.probe;
        ini.with_section(Some("probe"))
            .set("window_secs", secs(p.window))
            .set("max_duration_secs", secs(p.max_duration))
            .set("min_samples", p.min_samples.to_string())
            .set("target_samples", p.target_samples.to_string())
            .set("min_baseline_samples", p.min_baseline_samples.to_string())
            .set("baseline_tolerance", p.baseline_tolerance.to_string())
            .set("min_gradient", p.min_gradient.to_string())
            .set("max_fit_error", p.max_fit_error.to_string())
            .set("blend_rate", p.blend_rate.to_string())
            .set("history_size", p.history_size.to_string());

        let o = &self.offset;
        ini.with_section(Some("offset"))
            .set("max_offset", o.max_offset.to_string())
            .set("history_size", o.history_size.to_string())
            .set("smoothing", o.smoothing.to_string())
            .set("min_bucket_samples", o.min_bucket_samples.to_string())
            .set("hour_weight", o.hour_weight.to_string())
            .set("min_regression_samples", o.min_regression_samples.to_string())
            .set("min_outdoor_spread", o.min_outdoor_spread.to_string())
            .set("target_samples", o.target_samples.to_string())
            .set("learning_enabled", o.learning_enabled.to_string());

        // Tolerances matching the level are left empty so a level change
        // takes effect without editing them too
        let prefs = &self.preferences;
        let level_defaults = UserPreferences::for_level(prefs.level());
        let explicit = |value: f64, default: f64| {
            if (value - default).abs() < f64::EPSILON {
                String::new()
            } else {
                value.to_string()
            }
        };
        ini.with_section(Some("preferences"))
            .set("level", prefs.level().to_string())
            .set("comfort_band", explicit(prefs.comfort_band(), level_defaults.comfort_band()))
            .set(
                "confidence_threshold",
                explicit(prefs.confidence_threshold(), level_defaults.confidence_threshold()),
            )
            .set("probe_drift", explicit(prefs.probe_drift(), level_defaults.probe_drift()));

        ini.with_section(Some("storage"))
            .set("backend", self.storage.backend.as_str())
            .set("directory", path_string(self.storage.directory.as_deref()));

        ini.with_section(Some("logging"))
            .set("level", self.logging.level.as_str())
            .set("directory", path_string(self.logging.directory.as_deref()))
            .set("file_prefix", self.logging.file_prefix.as_str());

        ini
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thermal;
        let p = &t.probe;
        let o = &self.offset;

        let checks: [(bool, &str); 16] = [
            (t.evaluation_interval > Duration::ZERO, "thermal.evaluation_interval_secs must be positive"),
            (t.calibration_hour <= 23, "thermal.calibration_hour must be 0-23"),
            (
                t.inner_band_ratio > 0.0 && t.inner_band_ratio < 1.0,
                "thermal.inner_band_ratio must be between 0 and 1",
            ),
            (t.critical_deviation > 0.0, "thermal.critical_deviation must be positive"),
            (t.default_tau_cooling > 0.0, "thermal.default_tau_cooling must be positive"),
            (t.default_tau_warming > 0.0, "thermal.default_tau_warming must be positive"),
            (t.max_correction_bias >= 0.0, "thermal.max_correction_bias must not be negative"),
            (t.baseline_window >= 1, "thermal.baseline_window must be at least 1"),
            (p.window <= p.max_duration, "probe.window_secs must not exceed probe.max_duration_secs"),
            (p.min_samples <= p.target_samples, "probe.min_samples must not exceed probe.target_samples"),
            (
                p.blend_rate > 0.0 && p.blend_rate <= 1.0,
                "probe.blend_rate must be in (0, 1]",
            ),
            (p.history_size >= 1, "probe.history_size must be at least 1"),
            (o.max_offset >= 0.0, "offset.max_offset must not be negative"),
            (o.history_size >= 1, "offset.history_size must be at least 1"),
            (o.smoothing > 0.0 && o.smoothing <= 1.0, "offset.smoothing must be in (0, 1]"),
            ((0.0..=1.0).contains(&o.hour_weight), "offset.hour_weight must be in [0, 1]"),
        ];

        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, message)) => Err(ConfigError::Invalid(message.to_string())),
            None => Ok(()),
        }
    }
}

fn parse_preferences(section: &Section<'_>) -> Result<UserPreferences, ConfigError> {
    let level = match section.raw("level") {
        None => PreferenceLevel::default(),
        Some(value) => value
            .parse::<PreferenceLevel>()
            .map_err(|reason| section.error("level", value, reason))?,
    };

    let base = UserPreferences::for_level(level);
    let comfort_band = section.optional::<f64>("comfort_band")?;
    let confidence_threshold = section.optional::<f64>("confidence_threshold")?;
    let probe_drift = section.optional::<f64>("probe_drift")?;

    if comfort_band.is_none() && confidence_threshold.is_none() && probe_drift.is_none() {
        return Ok(base);
    }

    UserPreferences::custom(
        level,
        comfort_band.unwrap_or(base.comfort_band()),
        confidence_threshold.unwrap_or(base.confidence_threshold()),
        probe_drift.unwrap_or(base.probe_drift()),
    )
    .map_err(|e| ConfigError::Invalid(format!("preferences: {}", e)))
}

fn secs(duration: Duration) -> String {
    duration.as_secs_f64().to_string()
}

fn path_string(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string()).unwrap_or_default()
}

/// Typed access to one INI section.
struct Section<'a> {
    name: &'static str,
    props: Option<&'a Properties>,
}

impl<'a> Section<'a> {
    fn new(ini: &'a Ini, name: &'static str) -> Self {
        Self {
            name,
            props: ini.section(Some(name)),
        }
    }

    /// Trimmed value, `None` when absent or empty.
    fn raw(&self, key: &str) -> Option<&'a str> {
        self.props?.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    fn error(&self, key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::Parse {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn optional<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.raw(key)
            .map(|value| value.parse().map_err(|e: T::Err| self.error(key, value, e.to_string())))
            .transpose()
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.optional(key)?.unwrap_or(default))
    }

    fn number(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        let value = self.parse(key, default)?;
        if !value.is_finite() {
            return Err(self.error(key, &value.to_string(), "must be a finite number"));
        }
        Ok(value)
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let value = self.number(key, default.as_secs_f64())?;
        if value < 0.0 {
            return Err(self.error(key, &value.to_string(), "must not be negative"));
        }
        Duration::try_from_secs_f64(value).map_err(|e| self.error(key, &value.to_string(), e.to_string()))
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.raw(key) {
            None => Ok(default),
            Some(value) => match value.to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(self.error(key, value, "expected true or false")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.ini");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("absent.ini")).unwrap();

        assert_eq!(config.thermal.calibration_hour, 2);
        assert_eq!(config.offset.max_offset, 5.0);
        assert_eq!(config.preferences, UserPreferences::default());
        assert_eq!(config.storage.backend, StorageBackend::File);
    }

    #[test]
    fn test_partial_file_overrides_only_given_keys() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "[thermal]\ncalibration_hour = 4\nmin_dwell_secs = 300\n\n[offset]\nmax_offset = 3.5\nlearning_enabled = no\n",
        );
        let config = ConfigFile::load_from(&path).unwrap();

        assert_eq!(config.thermal.calibration_hour, 4);
        assert_eq!(config.thermal.min_dwell, Duration::from_secs(300));
        assert_eq!(config.thermal.critical_deviation, 3.0);
        assert_eq!(config.offset.max_offset, 3.5);
        assert!(!config.offset.learning_enabled);
    }

    #[test]
    fn test_malformed_value_names_key() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "[probe]\nmin_samples = lots\n");

        match ConfigFile::load_from(&path) {
            Err(ConfigError::Parse { section, key, value, .. }) => {
                assert_eq!(section, "probe");
                assert_eq!(key, "min_samples");
                assert_eq!(value, "lots");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_huge_duration_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "[thermal]\npriming_duration_secs = 1e30\n");

        match ConfigFile::load_from(&path) {
            Err(ConfigError::Parse { section, key, .. }) => {
                assert_eq!(section, "thermal");
                assert_eq!(key, "priming_duration_secs");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_value_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "[thermal]\ncalibration_hour = 25\n");
        assert!(matches!(ConfigFile::load_from(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_preference_level_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "[preferences]\nlevel = arctic\n");
        assert!(matches!(ConfigFile::load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_preference_level_with_explicit_band() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "[preferences]\nlevel = max_savings\ncomfort_band = 1.2\n");
        let prefs = ConfigFile::load_from(&path).unwrap().preferences();

        assert_eq!(prefs.level(), PreferenceLevel::MaxSavings);
        assert_eq!(prefs.comfort_band(), 1.2);
        assert_eq!(prefs.probe_drift(), 3.0);
    }

    #[test]
    fn test_save_then_load_preserves_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.thermal.calibration_hour = 5;
        config.thermal.probe.window = Duration::from_secs(2400);
        config.offset.smoothing = 0.25;
        config.preferences = UserPreferences::for_level(PreferenceLevel::MaxComfort);
        config.storage.backend = StorageBackend::Memory;
        config.logging.directory = Some(dir.path().join("logs"));
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded.thermal.calibration_hour, 5);
        assert_eq!(loaded.thermal.probe.window, Duration::from_secs(2400));
        assert_eq!(loaded.offset.smoothing, 0.25);
        assert_eq!(loaded.preferences, config.preferences);
        assert_eq!(loaded.storage, config.storage);
        assert_eq!(loaded.logging, config.logging);
    }
}
