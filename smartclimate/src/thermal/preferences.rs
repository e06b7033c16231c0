//! User comfort preferences.
//!
//! A preference level maps to a fixed set of tolerances. Preferences are
//! immutable; changing the level replaces the whole value.

use serde::{Deserialize, Serialize};

use super::error::{ThermalError, ThermalResult};

/// Trade-off between comfort and energy use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceLevel {
    /// Tightest band, most eager correction.
    MaxComfort,
    /// Comfort first, some drift allowed.
    ComfortPriority,
    /// Default trade-off.
    #[default]
    Balanced,
    /// Savings first, wider band.
    SavingsPriority,
    /// Widest band, lets the building do the most work.
    MaxSavings,
}

impl PreferenceLevel {
    /// All levels from most comfortable to most efficient.
    pub const ALL: [PreferenceLevel; 5] = [
        PreferenceLevel::MaxComfort,
        PreferenceLevel::ComfortPriority,
        PreferenceLevel::Balanced,
        PreferenceLevel::SavingsPriority,
        PreferenceLevel::MaxSavings,
    ];

    /// Get a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            PreferenceLevel::MaxComfort => "maximum comfort",
            PreferenceLevel::ComfortPriority => "comfort priority",
            PreferenceLevel::Balanced => "balanced",
            PreferenceLevel::SavingsPriority => "savings priority",
            PreferenceLevel::MaxSavings => "maximum savings",
        }
    }
}

impl std::fmt::Display for PreferenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreferenceLevel::MaxComfort => write!(f, "max_comfort"),
            PreferenceLevel::ComfortPriority => write!(f, "comfort_priority"),
            PreferenceLevel::Balanced => write!(f, "balanced"),
            PreferenceLevel::SavingsPriority => write!(f, "savings_priority"),
            PreferenceLevel::MaxSavings => write!(f, "max_savings"),
        }
    }
}

impl std::str::FromStr for PreferenceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "max_comfort" => Ok(Self::MaxComfort),
            "comfort_priority" | "comfort" => Ok(Self::ComfortPriority),
            "balanced" => Ok(Self::Balanced),
            "savings_priority" | "savings" => Ok(Self::SavingsPriority),
            "max_savings" => Ok(Self::MaxSavings),
            _ => {
                let names: Vec<String> = Self::ALL.iter().map(|l| l.to_string()).collect();
                Err(format!("unknown preference level '{}', expected one of {}", s, names.join(", ")))
            }
        }
    }
}

/// Comfort tolerances used by the thermal manager.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    level: PreferenceLevel,
    comfort_band: f64,
    confidence_threshold: f64,
    probe_drift: f64,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self::for_level(PreferenceLevel::Balanced)
    }
}

impl UserPreferences {
    /// Standard tolerances for a preference level.
    pub fn for_level(level: PreferenceLevel) -> Self {
        let (comfort_band, confidence_threshold, probe_drift) = match level {
            PreferenceLevel::MaxComfort => (0.3, 0.9, 1.0),
            PreferenceLevel::ComfortPriority => (0.5, 0.8, 1.5),
            PreferenceLevel::Balanced => (0.8, 0.6, 2.0),
            PreferenceLevel::SavingsPriority => (1.0, 0.5, 2.5),
            PreferenceLevel::MaxSavings => (1.5, 0.4, 3.0),
        };
        Self {
            level,
            comfort_band,
            confidence_threshold,
            probe_drift,
        }
    }

    /// Build preferences with explicit tolerances.
    pub fn custom(
        level: PreferenceLevel,
        comfort_band: f64,
        confidence_threshold: f64,
        probe_drift: f64,
    ) -> ThermalResult<Self> {
        if !(comfort_band.is_finite() && comfort_band > 0.0) {
            return Err(ThermalError::non_positive("comfort_band", comfort_band));
        }
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(ThermalError::Validation {
                parameter: "confidence_threshold",
                value: confidence_threshold,
                reason: "must be between 0 and 1",
            });
        }
        if !(probe_drift.is_finite() && probe_drift > 0.0) {
            return Err(ThermalError::non_positive("probe_drift", probe_drift));
        }
        Ok(Self {
            level,
            comfort_band,
            confidence_threshold,
            probe_drift,
        })
    }

    pub fn level(&self) -> PreferenceLevel {
        self.level
    }

    /// Allowed deviation from target before correction engages (°).
    pub fn comfort_band(&self) -> f64 {
        self.comfort_band
    }

    /// Minimum trust needed before predictive adjustments are used.
    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Drift allowed during a probe before it is aborted (°).
    pub fn probe_drift(&self) -> f64 {
        self.probe_drift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_balanced() {
        let prefs = UserPreferences::default();
        assert_eq!(prefs.level(), PreferenceLevel::Balanced);
        assert_eq!(prefs.comfort_band(), 0.8);
    }

    #[test]
    fn test_bands_widen_toward_savings() {
        let bands: Vec<f64> = PreferenceLevel::ALL
            .iter()
            .map(|level| UserPreferences::for_level(*level).comfort_band())
            .collect();
        assert!(bands.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!(
            "max_comfort".parse::<PreferenceLevel>().unwrap(),
            PreferenceLevel::MaxComfort
        );
        assert_eq!(
            "Savings-Priority".parse::<PreferenceLevel>().unwrap(),
            PreferenceLevel::SavingsPriority
        );
        assert_eq!(
            "Balanced".parse::<PreferenceLevel>().unwrap(),
            PreferenceLevel::Balanced
        );
        let err = "whatever".parse::<PreferenceLevel>().unwrap_err();
        assert!(err.contains("whatever"));
        assert!(err.contains("max_savings"));
    }

    #[test]
    fn test_level_display_round_trips() {
        for level in PreferenceLevel::ALL {
            assert_eq!(level.to_string().parse::<PreferenceLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_custom_validation() {
        assert!(UserPreferences::custom(PreferenceLevel::Balanced, 1.0, 0.5, 2.0).is_ok());
        assert!(UserPreferences::custom(PreferenceLevel::Balanced, 0.0, 0.5, 2.0).is_err());
        assert!(UserPreferences::custom(PreferenceLevel::Balanced, 1.0, 1.5, 2.0).is_err());
        assert!(UserPreferences::custom(PreferenceLevel::Balanced, 1.0, 0.5, -1.0).is_err());
    }
}
