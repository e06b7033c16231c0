//! Collaborator interfaces the thermal core depends on.
//!
//! Sensors, the operating-mode layer and the device that receives
//! temperature commands all live outside this crate. The core only sees them
//! through these narrow traits.
//!
//! # Dyn Compatibility
//!
//! Async methods return [`BoxFuture`] so the traits can be used as
//! `Arc<dyn Trait>` and injected per device.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read access to the sensors of one controlled space.
///
/// Every reading may be unavailable. Only the room temperature is required;
/// the rest default to unavailable.
pub trait SensorSource: Send + Sync {
    /// Controlled-room temperature (°).
    fn room_temperature(&self) -> Option<f64>;

    /// Outdoor temperature (°).
    fn outdoor_temperature(&self) -> Option<f64> {
        None
    }

    /// Device power draw (W).
    fn power_consumption(&self) -> Option<f64> {
        None
    }

    /// Indoor relative humidity (%).
    fn indoor_humidity(&self) -> Option<f64> {
        None
    }

    /// Outdoor relative humidity (%).
    fn outdoor_humidity(&self) -> Option<f64> {
        None
    }

    /// Temperature reported by the device's own internal sensor (°).
    fn device_internal_temperature(&self) -> Option<f64> {
        None
    }
}

/// Operating mode selected in the mode layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    #[default]
    None,
    Away,
    Sleep,
    Boost,
}

impl OperatingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::None => "none",
            OperatingMode::Away => "away",
            OperatingMode::Sleep => "sleep",
            OperatingMode::Boost => "boost",
        }
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperatingMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "away" => Self::Away,
            "sleep" => Self::Sleep,
            "boost" => Self::Boost,
            _ => Self::None,
        })
    }
}

/// Adjustments requested by the mode layer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModeAdjustments {
    /// Explicit target that replaces the requested setpoint.
    pub temperature_override: Option<f64>,
    /// Additive offset (°).
    pub offset_adjustment: f64,
    /// Requested control-tick interval.
    pub update_interval_override: Option<Duration>,
    /// Additive boost (°).
    pub boost_offset: f64,
    /// Ask the sink to act even if the value is unchanged.
    pub force_operation: bool,
}

impl ModeAdjustments {
    /// Combined additive adjustment.
    pub fn additive(&self) -> f64 {
        self.offset_adjustment + self.boost_offset
    }
}

/// Read access to the operating-mode layer.
pub trait ModeSource: Send + Sync {
    fn adjustments(&self) -> ModeAdjustments;

    fn current_mode(&self) -> OperatingMode;
}

/// Setpoint range accepted by a device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureLimits {
    pub min: f64,
    pub max: f64,
}

impl TemperatureLimits {
    pub fn new(min: f64, max: f64) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl Default for TemperatureLimits {
    fn default() -> Self {
        Self { min: 16.0, max: 30.0 }
    }
}

/// Errors from a temperature sink.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SinkError {
    /// The device refused the command.
    #[error("temperature command rejected: {0}")]
    Rejected(String),

    /// The device could not be reached.
    #[error("device unavailable: {0}")]
    Unavailable(String),
}

/// The device that receives temperature commands.
pub trait TemperatureSink: Send + Sync {
    /// Setpoint range the device accepts.
    fn limits(&self) -> TemperatureLimits;

    /// Apply device-specific offsets and clamp to limits.
    fn apply_offset_and_limits(&self, value: f64) -> f64 {
        self.limits().clamp(value)
    }

    /// Send a setpoint to the device.
    fn send_temperature_command(&self, value: f64) -> BoxFuture<'_, Result<(), SinkError>>;
}
