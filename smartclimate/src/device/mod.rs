//! Device identity and the narrow interfaces to external collaborators.

mod ids;
mod snapshot;
mod traits;

pub use ids::{DisplayId, PhysicalId};
pub use snapshot::DeviceSnapshot;
pub use traits::{
    BoxFuture, ModeAdjustments, ModeSource, OperatingMode, SensorSource, SinkError, TemperatureLimits,
    TemperatureSink,
};
