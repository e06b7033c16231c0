//! Error types for the thermal subsystem.

use std::fmt;

use thiserror::Error;

/// Result type for thermal model operations.
pub type ThermalResult<T> = Result<T, ThermalError>;

/// Errors raised by the physical model and the state machine.
///
/// Only [`ThermalError::Validation`] is ever surfaced to callers (it comes
/// from configuration-time input). [`ThermalError::StaleSensorData`] is
/// recorded on the tick outcome as the reason the output is degraded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThermalError {
    /// A physical-model parameter was rejected. The prior value is retained.
    #[error("invalid {parameter}: {value} ({reason})")]
    Validation {
        parameter: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// Required sensor input is missing or too old to trust.
    #[error("stale sensor data: {0}")]
    StaleSensorData(String),
}

impl ThermalError {
    pub(crate) fn non_positive(parameter: &'static str, value: f64) -> Self {
        Self::Validation {
            parameter,
            value,
            reason: "must be a finite value greater than zero",
        }
    }
}

/// Why a probe could not be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// A probe is already in progress.
    AlreadyActive,
    /// The user has a manual override in place.
    ManualOverride,
    /// No outdoor/ambient temperature to decay towards.
    AmbientUnknown,
    /// Not enough recent readings to judge stability.
    InsufficientBaseline,
    /// Recent readings move too much for a clean passive measurement.
    UnstableBaseline,
    /// Room and ambient are too close for a measurable decay.
    InsufficientGradient,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnavailableReason::AlreadyActive => "probe already active",
            UnavailableReason::ManualOverride => "manual override active",
            UnavailableReason::AmbientUnknown => "ambient temperature unavailable",
            UnavailableReason::InsufficientBaseline => "insufficient baseline history",
            UnavailableReason::UnstableBaseline => "baseline temperature not stable",
            UnavailableReason::InsufficientGradient => "room too close to ambient temperature",
        };
        f.write_str(text)
    }
}

/// Why an in-progress probe was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Temperature moved further than `probe_drift` from the starting point.
    DriftExceeded,
    /// An external manual override cancelled the probe.
    ManualOverride,
    /// The window hit its maximum duration, or the samples could not be fitted.
    Inconclusive,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AbortReason::DriftExceeded => "drift exceeded",
            AbortReason::ManualOverride => "cancelled by manual override",
            AbortReason::Inconclusive => "inconclusive",
        };
        f.write_str(text)
    }
}

/// Errors from the probe manager. Both variants are non-fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// Preconditions for starting a probe are not met; retry later.
    #[error("probe unavailable: {0}")]
    Unavailable(UnavailableReason),

    /// The probe was discarded; the physical model is untouched.
    #[error("probe aborted: {0}")]
    Aborted(AbortReason),
}
