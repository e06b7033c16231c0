//! Configuration for the thermal manager and probe manager.
//!
//! Every numeric threshold of the state machine lives here. The defaults are
//! starting points; all of them can be overridden from `config.ini`.
//!
//! # Example Configuration (INI)
//!
//! ```ini
//! [thermal]
//! calibration_hour = 2
//! priming_duration_secs = 86400
//! min_dwell_secs = 600
//!
//! [probe]
//! window_secs = 3600
//! max_duration_secs = 10800
//! ```

use std::time::Duration;

use super::model::{DEFAULT_CONFIDENCE_HALF_LIFE, DEFAULT_TAU_SECS};

/// Configuration for the thermal state machine.
#[derive(Debug, Clone)]
pub struct ThermalConfig {
    /// Expected time between control ticks.
    ///
    /// Horizon for anticipatory correction when a reading does not carry
    /// its own next-evaluation time: if the model predicts the room leaves
    /// the comfort band before the next tick, correction starts now.
    pub evaluation_interval: Duration,

    /// Observation period before the model is trusted at all.
    pub priming_duration: Duration,

    /// Deviation (°) that restarts the priming clock.
    pub critical_deviation: f64,

    /// Fraction of the comfort band the error must fall within before
    /// correction may stop.
    pub inner_band_ratio: f64,

    /// How long the error must stay inside the inner band before
    /// returning to drifting.
    pub min_dwell: Duration,

    /// Local hour (0-23) at which the daily calibration runs.
    pub calibration_hour: u32,

    /// Minimum spacing between confidence-triggered calibration attempts.
    pub min_probe_interval: Duration,

    /// How long calibration waits for probe preconditions before giving up.
    pub prepare_timeout: Duration,

    /// Readings older than this are treated as missing.
    pub stale_after: Duration,

    /// Setpoint bias per degree of error while correcting.
    pub correction_gain: f64,

    /// Largest bias (°) the manager will request.
    pub max_correction_bias: f64,

    /// Number of recent room readings kept for probe baseline checks.
    pub baseline_window: usize,

    /// Initial cooling time constant (seconds).
    pub default_tau_cooling: f64,

    /// Initial warming time constant (seconds).
    pub default_tau_warming: f64,

    /// Half-life of model confidence after a calibration.
    pub confidence_half_life: Duration,

    /// Probe parameters.
    pub probe: ProbeConfig,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            evaluation_interval: Duration::from_secs(60),
            priming_duration: Duration::from_secs(24 * 3600),
            critical_deviation: 3.0,
            inner_band_ratio: 0.5,
            min_dwell: Duration::from_secs(600),
            calibration_hour: 2,
            min_probe_interval: Duration::from_secs(12 * 3600),
            prepare_timeout: Duration::from_secs(1800),
            stale_after: Duration::from_secs(900),
            correction_gain: 1.0,
            max_correction_bias: 2.0,
            baseline_window: 12,
            default_tau_cooling: DEFAULT_TAU_SECS,
            default_tau_warming: DEFAULT_TAU_SECS,
            confidence_half_life: DEFAULT_CONFIDENCE_HALF_LIFE,
            probe: ProbeConfig::default(),
        }
    }
}

/// Configuration for passive-decay probes.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Observation window after which the probe is fitted.
    pub window: Duration,

    /// Hard ceiling; probes still open after this self-abort as inconclusive.
    pub max_duration: Duration,

    /// Fewest samples a fit is attempted with.
    pub min_samples: usize,

    /// Sample count that earns full sample confidence.
    pub target_samples: usize,

    /// Fewest baseline readings needed before a probe may start.
    pub min_baseline_samples: usize,

    /// Largest spread (°) of baseline readings considered stable.
    pub baseline_tolerance: f64,

    /// Smallest room/ambient difference (°) worth probing.
    pub min_gradient: f64,

    /// RMS residual (°) at which fit confidence reaches zero.
    pub max_fit_error: f64,

    /// Share of a fully confident estimate blended into the model.
    pub blend_rate: f64,

    /// Probe results retained in history.
    pub history_size: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(3600),
            max_duration: Duration::from_secs(3 * 3600),
            min_samples: 6,
            target_samples: 30,
            min_baseline_samples: 3,
            baseline_tolerance: 0.3,
            min_gradient: 1.0,
            max_fit_error: 0.5,
            blend_rate: 0.5,
            history_size: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thermal_config() {
        let config = ThermalConfig::default();
        assert_eq!(config.calibration_hour, 2);
        assert_eq!(config.inner_band_ratio, 0.5);
        assert!(config.inner_band_ratio < 1.0);
        assert!(config.critical_deviation > 0.0);
    }

    #[test]
    fn test_probe_window_inside_max_duration() {
        let config = ProbeConfig::default();
        assert!(config.window < config.max_duration);
        assert!(config.min_samples <= config.target_samples);
        assert!(config.blend_rate > 0.0 && config.blend_rate <= 1.0);
    }
}
