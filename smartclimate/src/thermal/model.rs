//! Passive thermal model.
//!
//! Single-pole exponential relaxation of room temperature toward the ambient
//! (outdoor) temperature while the device is idle:
//!
//! ```text
//! ΔT(t) = (T_ambient − T_start) · (1 − e^(−t/τ))
//! ```
//!
//! Two time constants are kept because buildings rarely lose and gain heat at
//! the same rate: `tau_cooling` applies when the room sits above ambient and
//! `tau_warming` when it sits below.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ThermalError, ThermalResult};

/// Default time constant for both directions (2 hours).
pub const DEFAULT_TAU_SECS: f64 = 7200.0;

/// Default half-life of model confidence after a calibration.
pub const DEFAULT_CONFIDENCE_HALF_LIFE: Duration = Duration::from_secs(7 * 24 * 3600);

/// Direction of passive temperature change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftDirection {
    /// Room is warmer than ambient and loses heat.
    Cooling,
    /// Room is colder than ambient and gains heat.
    Warming,
}

impl DriftDirection {
    /// Direction the room will drift in, given its temperature and ambient.
    pub fn between(room: f64, ambient: f64) -> Self {
        if room > ambient {
            DriftDirection::Cooling
        } else {
            DriftDirection::Warming
        }
    }
}

impl std::fmt::Display for DriftDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftDirection::Cooling => write!(f, "cooling"),
            DriftDirection::Warming => write!(f, "warming"),
        }
    }
}

/// Passive thermal model of one controlled space.
///
/// Mutation goes through [`update`](Self::update) or
/// [`apply_calibration`](Self::apply_calibration). Both validate every input
/// before assigning anything, so a rejected update leaves the model exactly
/// as it was.
#[derive(Debug, Clone, PartialEq)]
pub struct PassiveThermalModel {
    tau_cooling: f64,
    tau_warming: f64,
    confidence: f64,
    last_calibrated: Option<DateTime<Utc>>,
    confidence_half_life: Duration,
}

impl Default for PassiveThermalModel {
    fn default() -> Self {
        Self {
            tau_cooling: DEFAULT_TAU_SECS,
            tau_warming: DEFAULT_TAU_SECS,
            confidence: 0.0,
            last_calibrated: None,
            confidence_half_life: DEFAULT_CONFIDENCE_HALF_LIFE,
        }
    }
}

impl PassiveThermalModel {
    /// Create a model with explicit time constants.
    pub fn new(tau_cooling: f64, tau_warming: f64) -> ThermalResult<Self> {
        validate_tau("tau_cooling", tau_cooling)?;
        validate_tau("tau_warming", tau_warming)?;
        Ok(Self {
            tau_cooling,
            tau_warming,
            ..Default::default()
        })
    }

    /// Set how quickly calibration confidence fades.
    pub fn with_confidence_half_life(mut self, half_life: Duration) -> Self {
        self.confidence_half_life = half_life;
        self
    }

    /// Restore a previously persisted model.
    pub fn restored(
        tau_cooling: f64,
        tau_warming: f64,
        confidence: f64,
        last_calibrated: Option<DateTime<Utc>>,
    ) -> ThermalResult<Self> {
        let mut model = Self::new(tau_cooling, tau_warming)?;
        model.confidence = confidence.clamp(0.0, 1.0);
        model.last_calibrated = last_calibrated;
        Ok(model)
    }

    /// Time constant used while the room cools toward ambient (seconds).
    pub fn tau_cooling(&self) -> f64 {
        self.tau_cooling
    }

    /// Time constant used while the room warms toward ambient (seconds).
    pub fn tau_warming(&self) -> f64 {
        self.tau_warming
    }

    /// Time constant for a direction.
    pub fn tau(&self, direction: DriftDirection) -> f64 {
        match direction {
            DriftDirection::Cooling => self.tau_cooling,
            DriftDirection::Warming => self.tau_warming,
        }
    }

    /// Confidence recorded at the last calibration, before decay.
    pub fn base_confidence(&self) -> f64 {
        self.confidence
    }

    /// When the model last accepted a calibration.
    pub fn last_calibrated(&self) -> Option<DateTime<Utc>> {
        self.last_calibrated
    }

    /// Confidence at `now`, halving every `confidence_half_life`.
    pub fn confidence_at(&self, now: DateTime<Utc>) -> f64 {
        let Some(at) = self.last_calibrated else {
            return self.confidence;
        };
        let age_secs = (now - at).num_seconds().max(0) as f64;
        let half_life = self.confidence_half_life.as_secs_f64().max(1.0);
        self.confidence * 0.5_f64.powf(age_secs / half_life)
    }

    /// Expected signed temperature change after `elapsed_secs` of passive drift.
    ///
    /// The result points toward `ambient`, grows monotonically with time and
    /// never exceeds `|start - ambient|` in magnitude. Non-positive elapsed
    /// time predicts no change.
    pub fn predict_drift(&self, elapsed_secs: f64, start: f64, ambient: f64) -> f64 {
        self.predict_drift_for(DriftDirection::between(start, ambient), elapsed_secs, start, ambient)
    }

    /// Like [`predict_drift`](Self::predict_drift) with an explicit direction.
    pub fn predict_drift_for(
        &self,
        direction: DriftDirection,
        elapsed_secs: f64,
        start: f64,
        ambient: f64,
    ) -> f64 {
        if elapsed_secs.is_nan() || elapsed_secs <= 0.0 {
            return 0.0;
        }
        let tau = self.tau(direction);
        (ambient - start) * (1.0 - (-elapsed_secs / tau).exp())
    }

    /// Temperature expected after `elapsed_secs` of passive drift.
    pub fn predict_temperature(&self, elapsed_secs: f64, start: f64, ambient: f64) -> f64 {
        start + self.predict_drift(elapsed_secs, start, ambient)
    }

    /// Replace one or both time constants.
    ///
    /// Either both values are accepted or neither is; on error the previous
    /// constants are kept.
    pub fn update(&mut self, tau_cooling: Option<f64>, tau_warming: Option<f64>) -> ThermalResult<()> {
        if let Some(value) = tau_cooling {
            validate_tau("tau_cooling", value)?;
        }
        if let Some(value) = tau_warming {
            validate_tau("tau_warming", value)?;
        }

        if let Some(value) = tau_cooling {
            self.tau_cooling = value;
        }
        if let Some(value) = tau_warming {
            self.tau_warming = value;
        }

        tracing::debug!(
            tau_cooling = self.tau_cooling,
            tau_warming = self.tau_warming,
            "Thermal model time constants updated"
        );
        Ok(())
    }

    /// Record an accepted calibration for one direction.
    pub fn apply_calibration(
        &mut self,
        direction: DriftDirection,
        tau: f64,
        confidence: f64,
        at: DateTime<Utc>,
    ) -> ThermalResult<()> {
        match direction {
            DriftDirection::Cooling => self.update(Some(tau), None)?,
            DriftDirection::Warming => self.update(None, Some(tau))?,
        }
        self.confidence = confidence.clamp(0.0, 1.0);
        self.last_calibrated = Some(at);
        Ok(())
    }
}

fn validate_tau(parameter: &'static str, value: f64) -> ThermalResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ThermalError::non_positive(parameter, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_model() {
        let model = PassiveThermalModel::default();
        assert_eq!(model.tau_cooling(), DEFAULT_TAU_SECS);
        assert_eq!(model.tau_warming(), DEFAULT_TAU_SECS);
        assert_eq!(model.base_confidence(), 0.0);
        assert!(model.last_calibrated().is_none());
    }

    #[test]
    fn test_predict_drift_one_time_constant() {
        let model = PassiveThermalModel::new(100.0, 200.0).unwrap();
        // Cooling from 22 toward 12 for one tau: 10 * (1 - e^-1)
        let drift = model.predict_drift(100.0, 22.0, 12.0);
        let expected = -10.0 * (1.0 - (-1.0_f64).exp());
        assert!((drift - expected).abs() < 1e-9);
    }

    #[test]
    fn test_predict_drift_uses_warming_tau_below_ambient() {
        let model = PassiveThermalModel::new(100.0, 200.0).unwrap();
        let drift = model.predict_drift(200.0, 18.0, 28.0);
        let expected = 10.0 * (1.0 - (-1.0_f64).exp());
        assert!((drift - expected).abs() < 1e-9);
    }

    #[test]
    fn test_predict_drift_zero_time() {
        let model = PassiveThermalModel::default();
        assert_eq!(model.predict_drift(0.0, 22.0, 10.0), 0.0);
        assert_eq!(model.predict_drift(-5.0, 22.0, 10.0), 0.0);
    }

    #[test]
    fn test_update_rejects_non_positive_and_keeps_values() {
        let mut model = PassiveThermalModel::new(90.0, 120.0).unwrap();

        assert!(model.update(Some(0.0), None).is_err());
        assert!(model.update(None, Some(-3.0)).is_err());
        assert!(model.update(Some(f64::NAN), None).is_err());
        assert_eq!(model.tau_cooling(), 90.0);
        assert_eq!(model.tau_warming(), 120.0);
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let mut model = PassiveThermalModel::new(90.0, 120.0).unwrap();
        // Valid cooling value, invalid warming value: neither is applied
        assert!(model.update(Some(300.0), Some(0.0)).is_err());
        assert_eq!(model.tau_cooling(), 90.0);
        assert_eq!(model.tau_warming(), 120.0);

        model.update(Some(300.0), None).unwrap();
        assert_eq!(model.tau_cooling(), 300.0);
        assert_eq!(model.tau_warming(), 120.0);
    }

    #[test]
    fn test_new_rejects_invalid() {
        assert!(PassiveThermalModel::new(0.0, 10.0).is_err());
        assert!(PassiveThermalModel::new(10.0, -1.0).is_err());
    }

    #[test]
    fn test_confidence_decays_with_half_life() {
        let at = Utc::now();
        let mut model =
            PassiveThermalModel::default().with_confidence_half_life(Duration::from_secs(3600));
        model
            .apply_calibration(DriftDirection::Cooling, 1800.0, 0.8, at)
            .unwrap();

        assert!((model.confidence_at(at) - 0.8).abs() < 1e-9);
        let later = at + chrono::Duration::hours(1);
        assert!((model.confidence_at(later) - 0.4).abs() < 1e-6);
        assert_eq!(model.tau_cooling(), 1800.0);
    }

    proptest! {
        #[test]
        fn prop_drift_bounded_and_toward_ambient(
            t in 0.0f64..1e6,
            start in -20.0f64..40.0,
            ambient in -20.0f64..40.0,
            tau_c in 1.0f64..1e5,
            tau_w in 1.0f64..1e5,
        ) {
            let model = PassiveThermalModel::new(tau_c, tau_w).unwrap();
            let drift = model.predict_drift(t, start, ambient);
            prop_assert!(drift.abs() <= (start - ambient).abs() + 1e-9);
            prop_assert!(drift * (ambient - start) >= 0.0);
        }

        #[test]
        fn prop_drift_monotonic_in_time(
            t1 in 0.0f64..1e5,
            dt in 0.0f64..1e5,
            start in -20.0f64..40.0,
            ambient in -20.0f64..40.0,
        ) {
            let model = PassiveThermalModel::new(900.0, 1500.0).unwrap();
            let early = model.predict_drift(t1, start, ambient).abs();
            let late = model.predict_drift(t1 + dt, start, ambient).abs();
            prop_assert!(late + 1e-12 >= early);
        }
    }
}
