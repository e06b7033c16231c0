//! SmartClimate - adaptive thermal control for heating and cooling devices.
//!
//! The crate learns how a building passively gains and loses heat, decides
//! when to let the room drift and when to correct it, periodically
//! re-calibrates its physical model with short probes, learns the offset
//! between the device's own sensor and the room, and merges all of that
//! with user and mode overrides into one setpoint command.
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!   SensorSource ────► │          Controller          │ ◄──── ModeSource
//!                      │  DeviceSnapshot per tick     │
//!                      └──────┬───────────────┬───────┘
//!                             │               │
//!                   ┌─────────▼──────┐  ┌─────▼────────┐
//!                   │ ThermalManager │  │ OffsetEngine │──► RecordPersister ──► Storage
//!                   │  + ProbeManager│  │              │
//!                   │  + PassiveModel│  └─────┬────────┘
//!                   └─────────┬──────┘        │
//!                             ▼               ▼
//!                      ┌──────────────────────────────┐
//!                      │       PriorityResolver       │ ──► TemperatureSink
//!                      └──────────────────────────────┘
//! ```
//!
//! Device groups live in a [`registry::ThermalRegistry`] keyed by the
//! device's physical identifier.

pub mod config;
pub mod controller;
pub mod device;
pub mod logging;
pub mod offset;
pub mod persistence;
pub mod registry;
pub mod resolver;
pub mod thermal;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
