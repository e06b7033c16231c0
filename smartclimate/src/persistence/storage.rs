//! Byte-level durable storage keyed by physical identifier.
//!
//! The `Storage` trait is the only surface persistence depends on. Backends
//! store opaque bytes; encoding is the record's concern.
//!
//! # Dyn Compatibility
//!
//! Methods return [`BoxFuture`] so a backend can be shared as
//! `Arc<dyn Storage>` across devices.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use crate::device::{BoxFuture, PhysicalId};

use super::error::PersistenceError;

/// Durable byte storage.
///
/// Implementations must be `Send + Sync`. A `write` that returns `Ok` must
/// leave either the complete new value or the complete old value behind,
/// never a partial one.
pub trait Storage: Send + Sync {
    /// Read the stored bytes for a device.
    ///
    /// Returns `Ok(None)` when nothing has been stored yet.
    fn read(&self, device: &PhysicalId) -> BoxFuture<'_, Result<Option<Vec<u8>>, PersistenceError>>;

    /// Replace the stored bytes for a device.
    fn write(&self, device: &PhysicalId, bytes: Vec<u8>) -> BoxFuture<'_, Result<(), PersistenceError>>;

    /// Remove the stored bytes for a device.
    ///
    /// Returns `Ok(true)` if something was removed.
    fn remove(&self, device: &PhysicalId) -> BoxFuture<'_, Result<bool, PersistenceError>>;
}

/// In-memory storage for tests and simulation.
///
/// Optionally delays writes and can be switched into a failing mode to
/// exercise retry paths.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: DashMap<PhysicalId, Vec<u8>>,
    write_delay: Option<Duration>,
    fail_writes: AtomicBool,
    writes: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write take at least `delay`.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of writes that reached the backend (successful or not).
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Stored bytes for a device, bypassing the async interface.
    pub fn get(&self, device: &PhysicalId) -> Option<Vec<u8>> {
        self.records.get(device).map(|entry| entry.value().clone())
    }

    /// Store bytes directly, bypassing the async interface.
    pub fn insert(&self, device: PhysicalId, bytes: Vec<u8>) {
        self.records.insert(device, bytes);
    }
}

impl Storage for MemoryStorage {
    fn read(&self, device: &PhysicalId) -> BoxFuture<'_, Result<Option<Vec<u8>>, PersistenceError>> {
        let bytes = self.get(device);
        Box::pin(async move { Ok(bytes) })
    }

    fn write(&self, device: &PhysicalId, bytes: Vec<u8>) -> BoxFuture<'_, Result<(), PersistenceError>> {
        let device = device.clone();
        Box::pin(async move {
            if let Some(delay) = self.write_delay {
                tokio::time::sleep(delay).await;
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(PersistenceError::WriteFailed {
                    device,
                    reason: "storage configured to fail".to_string(),
                });
            }
            self.records.insert(device, bytes);
            Ok(())
        })
    }

    fn remove(&self, device: &PhysicalId) -> BoxFuture<'_, Result<bool, PersistenceError>> {
        let removed = self.records.remove(device).is_some();
        Box::pin(async move { Ok(removed) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let storage = MemoryStorage::new();
        let device = PhysicalId::new("unit-1");

        assert!(storage.read(&device).await.unwrap().is_none());
        storage.write(&device, b"{}".to_vec()).await.unwrap();
        assert_eq!(storage.read(&device).await.unwrap(), Some(b"{}".to_vec()));
        assert_eq!(storage.write_count(), 1);

        assert!(storage.remove(&device).await.unwrap());
        assert!(!storage.remove(&device).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_failing_writes_keep_old_value() {
        let storage = MemoryStorage::new();
        let device = PhysicalId::new("unit-1");
        storage.write(&device, b"old".to_vec()).await.unwrap();

        storage.set_fail_writes(true);
        let result = storage.write(&device, b"new".to_vec()).await;
        assert!(matches!(result, Err(PersistenceError::WriteFailed { .. })));
        assert_eq!(storage.get(&device), Some(b"old".to_vec()));
    }
}
