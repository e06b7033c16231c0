//! On-disk device record.
//!
//! ```json
//! {
//!   "version": 1,
//!   "device": "living-room-ac",
//!   "tau_cooling": 7200.0,
//!   "tau_warming": 7200.0,
//!   "model_confidence": 0.82,
//!   "last_calibrated": "2024-01-15T02:00:00Z",
//!   "probe_history": [ ... ],
//!   "last_calibration_date": "2024-01-15",
//!   "primed": true,
//!   "last_scheduled_attempt": "2024-01-15",
//!   "offset_learning_state": { ... },
//!   "confidence": 0.64,
//!   "saved_at": "2024-01-15T03:00:00Z"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::PhysicalId;
use crate::offset::OffsetLearningState;
use crate::thermal::ThermalSnapshot;

use super::error::PersistenceError;

/// Current record format version.
pub const RECORD_VERSION: u32 = 1;

/// Everything persisted for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub version: u32,
    pub device: PhysicalId,
    #[serde(flatten)]
    pub thermal: ThermalSnapshot,
    pub offset_learning_state: OffsetLearningState,
    /// Offset learning confidence (0.0 - 1.0).
    pub confidence: f64,
    pub saved_at: DateTime<Utc>,
}

impl DeviceRecord {
    /// Build a record stamped with the current format version.
    pub fn new(
        device: PhysicalId,
        thermal: ThermalSnapshot,
        offset_learning_state: OffsetLearningState,
        saved_at: DateTime<Utc>,
    ) -> Self {
        let confidence = offset_learning_state.confidence;
        Self {
            version: RECORD_VERSION,
            device,
            thermal,
            offset_learning_state,
            confidence,
            saved_at,
        }
    }

    /// Encode as pretty-printed JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistenceError> {
        serde_json::to_vec_pretty(self).map_err(PersistenceError::Serialize)
    }

    /// Decode from JSON, rejecting records written by a newer format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistenceError> {
        let record: Self = serde_json::from_slice(bytes).map_err(PersistenceError::Deserialize)?;
        if record.version > RECORD_VERSION {
            return Err(PersistenceError::Deserialize(serde::de::Error::custom(format!(
                "unsupported record version {} (newest known is {})",
                record.version, RECORD_VERSION
            ))));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn record() -> DeviceRecord {
        let thermal = ThermalSnapshot {
            tau_cooling: 5400.0,
            tau_warming: 9000.0,
            model_confidence: 0.7,
            last_calibrated: Some(Utc.with_ymd_and_hms(2024, 1, 15, 3, 0, 0).unwrap()),
            probe_history: Vec::new(),
            last_calibration_date: NaiveDate::from_ymd_opt(2024, 1, 15),
            primed: true,
            last_scheduled_attempt: NaiveDate::from_ymd_opt(2024, 1, 15),
        };
        DeviceRecord::new(
            PhysicalId::new("unit-1"),
            thermal,
            OffsetLearningState::default(),
            Utc.with_ymd_and_hms(2024, 1, 15, 3, 5, 0).unwrap(),
        )
    }

    #[test]
    fn test_record_fields_are_flat() {
        let bytes = record().to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["version"], 1);
        assert_eq!(value["tau_cooling"], 5400.0);
        assert_eq!(value["last_calibration_date"], "2024-01-15");
        assert_eq!(value["last_scheduled_attempt"], "2024-01-15");
        assert!(value["offset_learning_state"].is_object());
        assert!(value["probe_history"].is_array());
    }

    #[test]
    fn test_decode_encoded_record() {
        let original = record();
        let decoded = DeviceRecord::from_bytes(&original.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_rejects_newer_version() {
        let mut newer = record();
        newer.version = RECORD_VERSION + 1;
        let bytes = newer.to_bytes().unwrap();
        assert!(matches!(
            DeviceRecord::from_bytes(&bytes),
            Err(PersistenceError::Deserialize(_))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            DeviceRecord::from_bytes(b"not json"),
            Err(PersistenceError::Deserialize(_))
        ));
    }
}
