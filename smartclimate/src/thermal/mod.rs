//! Thermal management: physical model, calibration probes and the
//! drift/correct state machine.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      ThermalManager                        │
//! │  ┌──────────────────┐ ┌─────────────────┐ ┌──────────────┐ │
//! │  │PassiveThermalModel│ │ UserPreferences │ │ ProbeManager │ │
//! │  │ tau_cooling/warm │ │ band, threshold │ │ fit + blend  │ │
//! │  └──────────────────┘ └─────────────────┘ └──────────────┘ │
//! │        Priming → Drifting ⇄ Correcting → Calibrating       │
//! └────────────────────────────────────────────────────────────┘
//!                             │
//!                             ▼
//!                    ThermalAdjustment (bias, mode)
//! ```
//!
//! One manager exists per controlled device, keyed by its physical identifier.
//! Ticks are synchronous; nothing in this module performs I/O.

mod config;
mod error;
mod manager;
mod model;
mod preferences;
mod probe;
mod state;

pub use config::{ProbeConfig, ThermalConfig};
pub use error::{AbortReason, ProbeError, ThermalError, ThermalResult, UnavailableReason};
pub use manager::{
    CalibrationTrigger, ProbeEvent, StateTransition, ThermalManager, ThermalReading, ThermalSnapshot,
    TickOutcome,
};
pub use model::{DriftDirection, PassiveThermalModel, DEFAULT_CONFIDENCE_HALF_LIFE, DEFAULT_TAU_SECS};
pub use preferences::{PreferenceLevel, UserPreferences};
pub use probe::{ProbeManager, ProbeRequest, ProbeResult};
pub use state::{AdjustmentMode, CalibrationPhase, ThermalAdjustment, ThermalState};
