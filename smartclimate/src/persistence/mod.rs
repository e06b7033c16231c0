//! Durable, crash-safe storage of per-device learning state.
//!
//! # Architecture
//!
//! ```text
//! OffsetEngine::save_async / save
//!        │  DeviceRecord (serialized at request time)
//!        ▼
//! ┌──────────────────┐   one write in flight,
//! │  RecordPersister │   newest request pending
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  dyn Storage     │──► FileStorage (temp + fsync + rename)
//! └──────────────────┘──► MemoryStorage
//! ```

mod error;
mod file;
mod persister;
mod record;
mod storage;

pub use error::PersistenceError;
pub use file::FileStorage;
pub use persister::RecordPersister;
pub use record::{DeviceRecord, RECORD_VERSION};
pub use storage::{MemoryStorage, Storage};
