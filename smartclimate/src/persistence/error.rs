//! Persistence errors.

use thiserror::Error;

use crate::device::PhysicalId;

/// Errors raised while reading or writing device records.
///
/// None of these ever fail a control tick; failed writes are flagged and
/// retried at the next checkpoint.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// I/O error from the storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be encoded.
    #[error("failed to serialize record: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The stored bytes are not a valid record.
    #[error("failed to parse record: {0}")]
    Deserialize(#[source] serde_json::Error),

    /// A write for this device did not complete.
    #[error("write failed for {device}: {reason}")]
    WriteFailed { device: PhysicalId, reason: String },

    /// No async runtime was available to run the write.
    #[error("no async runtime available to persist state")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: PersistenceError = io.into();
        assert!(matches!(err, PersistenceError::Io(_)));
    }

    #[test]
    fn test_write_failed_names_device() {
        let err = PersistenceError::WriteFailed {
            device: PhysicalId::new("unit-3"),
            reason: "disk full".to_string(),
        };
        assert_eq!(err.to_string(), "write failed for unit-3: disk full");
    }
}
