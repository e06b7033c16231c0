//! Coalescing record writer.
//!
//! At most one physical write per device is in flight. Requests that arrive
//! while a write is running replace each other in a single pending slot, so
//! any burst of requests produces exactly one follow-up write carrying the
//! newest bytes.
//!
//! # Flow
//!
//! ```text
//! request(bytes) ──► idle? ──yes──► spawn writer ──► write ──► pending? ──yes──► write newest
//!                      │                                │                             │
//!                      no                               no                            ▼
//!                      ▼                                ▼                            ...
//!              pending = newest                    idle, notify
//! ```
//!
//! Bytes are captured at request time, so a write completing late can never
//! overwrite newer in-memory state with older state. Writes are never
//! cancelled once issued.
//!
//! # Failures
//!
//! A failed write is logged and leaves the persister dirty. The next request
//! supersedes it; [`RecordPersister::retry`] re-issues the failed bytes when
//! nothing newer has been requested.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::device::PhysicalId;

use super::error::PersistenceError;
use super::storage::Storage;

/// Outcome of the most recently finished write.
#[derive(Debug, Clone, Default)]
struct Completion {
    /// Sequence number of the request whose bytes were written.
    seq: u64,
    /// Failure message, if the write failed.
    error: Option<String>,
}

#[derive(Debug, Default)]
struct WriteState {
    /// Sequence number of the latest request.
    last_seq: u64,
    /// Whether a writer task is running.
    in_flight: bool,
    /// Newest request waiting behind the in-flight write.
    pending: Option<(u64, Vec<u8>)>,
    /// Bytes of a write that failed and has not been superseded.
    failed: Option<(u64, Vec<u8>)>,
    /// Physical writes started.
    writes_started: u64,
}

struct Inner {
    device: PhysicalId,
    storage: Arc<dyn Storage>,
    state: Mutex<WriteState>,
    completed: watch::Sender<Completion>,
}

/// Serializes and coalesces record writes for one device.
///
/// Cheap to clone; clones share the same write slot.
#[derive(Clone)]
pub struct RecordPersister {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RecordPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RecordPersister")
            .field("device", &self.inner.device)
            .field("last_seq", &state.last_seq)
            .field("in_flight", &state.in_flight)
            .field("dirty", &state.failed.is_some())
            .finish()
    }
}

impl RecordPersister {
    pub fn new(device: PhysicalId, storage: Arc<dyn Storage>) -> Self {
        let (completed, _) = watch::channel(Completion::default());
        Self {
            inner: Arc::new(Inner {
                device,
                storage,
                state: Mutex::new(WriteState::default()),
                completed,
            }),
        }
    }

    pub fn device(&self) -> &PhysicalId {
        &self.inner.device
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    /// Read the stored bytes for this device.
    pub async fn read(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.inner.storage.read(&self.inner.device).await
    }

    /// Request a write of `bytes` without waiting for it.
    ///
    /// Returns the request's sequence number for [`wait_for`](Self::wait_for).
    /// Fails with [`PersistenceError::NoRuntime`] outside a tokio runtime; the
    /// bytes are then kept as a failed write for a later retry.
    pub fn request(&self, bytes: Vec<u8>) -> Result<u64, PersistenceError> {
        let mut state = self.inner.state.lock();
        state.last_seq += 1;
        let seq = state.last_seq;

        if state.in_flight {
            if let Some((replaced, _)) = state.pending.replace((seq, bytes)) {
                tracing::trace!(
                    device = %self.inner.device,
                    replaced,
                    seq,
                    "Save coalesced into pending write"
                );
            }
            return Ok(seq);
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    device = %self.inner.device,
                    "No async runtime, state not persisted"
                );
                state.failed = Some((seq, bytes));
                return Err(PersistenceError::NoRuntime);
            }
        };

        state.in_flight = true;
        drop(state);

        let inner = Arc::clone(&self.inner);
        handle.spawn(async move { inner.run_writes(seq, bytes).await });
        Ok(seq)
    }

    /// Wait until the write carrying request `seq` (or a newer one) finishes.
    pub async fn wait_for(&self, seq: u64) -> Result<(), PersistenceError> {
        let mut rx = self.inner.completed.subscribe();
        let completion = rx
            .wait_for(|c| c.seq >= seq)
            .await
            .map_err(|_| PersistenceError::NoRuntime)?
            .clone();

        match completion.error {
            None => Ok(()),
            Some(reason) => Err(PersistenceError::WriteFailed {
                device: self.inner.device.clone(),
                reason,
            }),
        }
    }

    /// Request a write and wait for it to finish.
    pub async fn persist(&self, bytes: Vec<u8>) -> Result<(), PersistenceError> {
        let seq = self.request(bytes)?;
        self.wait_for(seq).await
    }

    /// Re-issue the last failed write unless something newer was requested.
    ///
    /// Returns the sequence number of the retried request, if any.
    pub fn retry(&self) -> Result<Option<u64>, PersistenceError> {
        let failed = {
            let mut state = self.inner.state.lock();
            match state.failed.take() {
                Some((seq, bytes)) if seq == state.last_seq && !state.in_flight => Some(bytes),
                Some(other) => {
                    // Superseded by a newer request; keep the flag until it lands
                    state.failed = Some(other);
                    None
                }
                None => None,
            }
        };

        match failed {
            Some(bytes) => {
                tracing::info!(device = %self.inner.device, "Retrying failed save");
                self.request(bytes).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Wait for everything requested so far, retrying a failed write once.
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        if let Some(seq) = self.retry()? {
            return self.wait_for(seq).await;
        }
        let (last_seq, dirty) = {
            let state = self.inner.state.lock();
            (state.last_seq, state.failed.is_some())
        };
        if last_seq == 0 {
            return Ok(());
        }
        self.wait_for(last_seq).await?;
        if dirty && self.is_dirty() {
            return Err(PersistenceError::WriteFailed {
                device: self.inner.device.clone(),
                reason: "last save failed".to_string(),
            });
        }
        Ok(())
    }

    /// Whether the most recent finished write failed and is not yet superseded.
    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().failed.is_some()
    }

    /// Whether a write is running.
    pub fn is_writing(&self) -> bool {
        self.inner.state.lock().in_flight
    }

    /// Physical writes started so far.
    pub fn writes_started(&self) -> u64 {
        self.inner.state.lock().writes_started
    }
}

impl Inner {
    /// Write `bytes`, then drain the pending slot until it is empty.
    async fn run_writes(self: Arc<Self>, mut seq: u64, mut bytes: Vec<u8>) {
        loop {
            self.state.lock().writes_started += 1;
            let retained = bytes.clone();
            let result = self.storage.write(&self.device, bytes).await;

            let next = {
                let mut state = self.state.lock();
                let error = match result {
                    Ok(()) => {
                        if state.failed.as_ref().is_some_and(|(failed, _)| *failed <= seq) {
                            state.failed = None;
                        }
                        tracing::debug!(device = %self.device, seq, "Record saved");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(
                            device = %self.device,
                            seq,
                            error = %e,
                            "Record save failed, will retry at next checkpoint"
                        );
                        state.failed = Some((seq, retained));
                        Some(e.to_string())
                    }
                };
                self.completed.send_replace(Completion { seq, error });

                match state.pending.take() {
                    Some(next) => Some(next),
                    None => {
                        state.in_flight = false;
                        None
                    }
                }
            };

            match next {
                Some((next_seq, next_bytes)) => {
                    seq = next_seq;
                    bytes = next_bytes;
                }
                None => break,
            }
        }
    }
}
