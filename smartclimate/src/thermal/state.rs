//! Thermal manager states and the per-tick adjustment they produce.

use serde::{Deserialize, Serialize};

/// Sub-phase of calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationPhase {
    /// Waiting for probe preconditions (stable baseline, known ambient).
    Preparing,
    /// Active measurement window.
    Probing,
}

/// Operating state of a thermal manager.
///
/// ```text
///            priming elapsed            |error| > band (or predicted)
///  Priming ─────────────────► Drifting ─────────────────────────► Correcting
///                               ▲  │ ◄──── inner band for min_dwell ──┘ │
///                               │  │ calibration hour / low confidence   │
///                               │  ▼                                     ▼
///                             Calibrating(Preparing ──► Probing)  ◄──────┘
///                               └── completion / abort / override ──► by error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalState {
    /// Not enough history to trust the model.
    #[default]
    Priming,
    /// Inside the comfort band; the device idles and the room drifts.
    Drifting,
    /// Outside (or about to leave) the comfort band; driving toward target.
    Correcting,
    /// Measuring the building's time constants.
    Calibrating(CalibrationPhase),
}

impl ThermalState {
    /// Get a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            ThermalState::Priming => "learning building response",
            ThermalState::Drifting => "passive drift within comfort band",
            ThermalState::Correcting => "actively correcting toward target",
            ThermalState::Calibrating(CalibrationPhase::Preparing) => "preparing calibration probe",
            ThermalState::Calibrating(CalibrationPhase::Probing) => "measuring passive decay",
        }
    }

    /// Whether this is either calibration sub-phase.
    pub fn is_calibrating(&self) -> bool {
        matches!(self, ThermalState::Calibrating(_))
    }

    /// Whether this is the active measurement sub-phase.
    pub fn is_probing(&self) -> bool {
        matches!(self, ThermalState::Calibrating(CalibrationPhase::Probing))
    }
}

impl std::fmt::Display for ThermalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThermalState::Priming => write!(f, "priming"),
            ThermalState::Drifting => write!(f, "drifting"),
            ThermalState::Correcting => write!(f, "correcting"),
            ThermalState::Calibrating(CalibrationPhase::Preparing) => write!(f, "calibrating"),
            ThermalState::Calibrating(CalibrationPhase::Probing) => write!(f, "probing"),
        }
    }
}

/// What the thermal layer asks of the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentMode {
    /// No opinion yet (priming).
    Passive,
    /// Let the room drift; no correction.
    AllowDrift,
    /// Bias the setpoint toward target.
    Correct,
    /// Keep the bias that was in force before calibration.
    Hold,
}

impl std::fmt::Display for AdjustmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdjustmentMode::Passive => write!(f, "passive"),
            AdjustmentMode::AllowDrift => write!(f, "allow_drift"),
            AdjustmentMode::Correct => write!(f, "correct"),
            AdjustmentMode::Hold => write!(f, "hold"),
        }
    }
}

/// Per-tick thermal adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalAdjustment {
    /// Setpoint bias in degrees (negative lowers the setpoint).
    pub bias: f64,
    /// Which behaviour produced the bias.
    pub mode: AdjustmentMode,
    /// Inputs were missing or stale; the bias is the last known one.
    pub degraded: bool,
    /// Human-readable explanation.
    pub reason: String,
}

impl ThermalAdjustment {
    /// An adjustment that contributes nothing.
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            bias: 0.0,
            mode: AdjustmentMode::Passive,
            degraded: false,
            reason: reason.into(),
        }
    }

    /// Whether this adjustment changes the setpoint.
    pub fn is_active(&self) -> bool {
        self.bias.abs() > f64::EPSILON
    }
}
