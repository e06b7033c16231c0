//! Learned compensation for device sensor offsets.
//!
//! Split units read temperature at the indoor coil, which rarely matches the
//! room. Each control tick records the discrepancy, and the engine predicts
//! the setpoint offset that makes the device target what the room actually
//! needs.
//!
//! ```text
//! DeviceSnapshot ──► OffsetSample ──► OffsetEngine::record_observation
//!                                         │ refit
//!                                         ▼
//! OffsetContext ───────────────────► OffsetModel::predict ──► clamp ──► OffsetPrediction
//! ```

mod config;
mod engine;
mod model;
mod types;

pub use config::OffsetConfig;
pub use engine::OffsetEngine;
pub use model::{HourBucket, OffsetModel, OutdoorRegression, RawOffset};
pub use types::{OffsetContext, OffsetError, OffsetLearningState, OffsetPrediction, OffsetSample};
