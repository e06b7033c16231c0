//! Offset learning data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::{DeviceSnapshot, OperatingMode};

use super::model::OffsetModel;

/// Errors from offset learning.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OffsetError {
    /// The sample cannot be learned from.
    #[error("invalid offset sample: {0}")]
    InvalidSample(String),
}

/// Conditions an offset is learned or predicted under.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OffsetContext {
    /// Local hour (0-23).
    pub hour: u32,
    #[serde(default)]
    pub outdoor_temperature: Option<f64>,
    #[serde(default)]
    pub power_consumption: Option<f64>,
    #[serde(default)]
    pub mode: OperatingMode,
}

impl OffsetContext {
    pub fn from_snapshot(snapshot: &DeviceSnapshot) -> Self {
        Self {
            hour: snapshot.hour().unwrap_or_default(),
            outdoor_temperature: snapshot.outdoor_temperature,
            power_consumption: snapshot.power_consumption,
            mode: snapshot.mode,
        }
    }
}

/// One observed discrepancy between the device's internal sensor and the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetSample {
    /// Device-internal minus room temperature (°).
    pub observed_delta: f64,
    pub features: OffsetContext,
    pub timestamp: DateTime<Utc>,
}

impl OffsetSample {
    /// Sample from a snapshot that has both temperatures and a capture time.
    pub fn from_snapshot(snapshot: &DeviceSnapshot) -> Option<Self> {
        Some(Self {
            observed_delta: snapshot.sensor_delta()?,
            features: OffsetContext::from_snapshot(snapshot),
            timestamp: snapshot.captured_at?.with_timezone(&Utc),
        })
    }
}

/// Result of [`OffsetEngine::calculate_offset`](super::OffsetEngine::calculate_offset).
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetPrediction {
    /// Offset to add to the setpoint (°).
    pub offset: f64,
    /// Whether the learned value exceeded the configured maximum.
    pub clamped: bool,
    pub reason: String,
    /// Trust in the learned model (0.0 - 1.0).
    pub confidence: f64,
    /// Samples the prediction is based on.
    pub sample_count: usize,
}

impl OffsetPrediction {
    /// Prediction used before anything has been learned.
    pub fn no_data() -> Self {
        Self {
            offset: 0.0,
            clamped: false,
            reason: "no learning data".to_string(),
            confidence: 0.0,
            sample_count: 0,
        }
    }

    /// Learned data exists but earns no trust.
    pub fn is_untrusted(&self) -> bool {
        self.sample_count > 0 && self.confidence <= 0.0
    }
}

/// Persisted learning state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetLearningState {
    #[serde(default)]
    pub samples: Vec<OffsetSample>,
    #[serde(default)]
    pub model: OffsetModel,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default = "default_learning_enabled")]
    pub learning_enabled: bool,
}

impl Default for OffsetLearningState {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            model: OffsetModel::default(),
            confidence: 0.0,
            learning_enabled: true,
        }
    }
}

fn default_learning_enabled() -> bool {
    true
}
