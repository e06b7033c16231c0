//! Point-in-time view of a device and its sensors.

use chrono::{DateTime, Local, Timelike};

use crate::thermal::ThermalReading;

use super::traits::{ModeAdjustments, ModeSource, OperatingMode, SensorSource};

/// Everything the control tick reads from collaborators, captured once.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceSnapshot {
    pub room_temperature: Option<f64>,
    pub outdoor_temperature: Option<f64>,
    pub power_consumption: Option<f64>,
    pub indoor_humidity: Option<f64>,
    pub outdoor_humidity: Option<f64>,
    pub device_internal_temperature: Option<f64>,
    pub mode: OperatingMode,
    pub adjustments: ModeAdjustments,
    pub captured_at: Option<DateTime<Local>>,
}

impl DeviceSnapshot {
    /// Read all sensors and the mode layer.
    pub fn capture(sensors: &dyn SensorSource, modes: Option<&dyn ModeSource>, now: DateTime<Local>) -> Self {
        let (mode, adjustments) = modes
            .map(|m| (m.current_mode(), m.adjustments()))
            .unwrap_or_default();

        Self {
            room_temperature: finite(sensors.room_temperature()),
            outdoor_temperature: finite(sensors.outdoor_temperature()),
            power_consumption: finite(sensors.power_consumption()),
            indoor_humidity: finite(sensors.indoor_humidity()),
            outdoor_humidity: finite(sensors.outdoor_humidity()),
            device_internal_temperature: finite(sensors.device_internal_temperature()),
            mode,
            adjustments,
            captured_at: Some(now),
        }
    }

    /// Thermal-manager input for this snapshot.
    ///
    /// A snapshot without a capture time is treated as captured at the
    /// Unix epoch, which the manager rejects as stale.
    pub fn thermal_reading(&self, target_temperature: f64, manual_override: bool) -> ThermalReading {
        ThermalReading {
            room_temperature: self.room_temperature,
            outdoor_temperature: self.outdoor_temperature,
            target_temperature,
            manual_override,
            captured_at: self.captured_at.unwrap_or_default(),
            next_evaluation: None,
        }
    }

    /// Device-internal minus room temperature, when both are known.
    pub fn sensor_delta(&self) -> Option<f64> {
        Some(self.device_internal_temperature? - self.room_temperature?)
    }

    /// Local hour of capture.
    pub fn hour(&self) -> Option<u32> {
        self.captured_at.map(|at| at.hour())
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}
