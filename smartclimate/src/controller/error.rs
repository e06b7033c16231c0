use thiserror::Error;

use crate::device::{PhysicalId, SinkError};
use crate::persistence::PersistenceError;

/// Errors surfaced by explicit controller calls.
///
/// Control ticks never fail; these come from construction, direct commands
/// and the shutdown flush.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("device {0} is not registered")]
    UnknownDevice(PhysicalId),

    #[error("temperature sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("failed to persist state: {0}")]
    Persistence(#[from] PersistenceError),
}
