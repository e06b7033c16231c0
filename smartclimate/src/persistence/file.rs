//! File-backed storage.
//!
//! Each device is stored as `<dir>/<physical_id>.json`. Writes go to a
//! temporary sibling, are flushed to disk, then renamed over the target, so
//! a crash leaves either the old or the new record. All file I/O runs on the
//! blocking thread pool via `spawn_blocking`.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::device::{BoxFuture, PhysicalId};

use super::error::PersistenceError;
use super::storage::Storage;

/// Extension of record files.
const RECORD_EXTENSION: &str = "json";

/// Extension of in-progress writes.
const TEMP_EXTENSION: &str = "json.tmp";

/// Stores one JSON file per device in a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create storage rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default storage directory (`<data dir>/smartclimate/devices`).
    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("smartclimate")
            .join("devices")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for a device.
    pub fn path_for(&self, device: &PhysicalId) -> PathBuf {
        self.dir
            .join(format!("{}.{}", device.file_stem(), RECORD_EXTENSION))
    }
}

impl Storage for FileStorage {
    fn read(&self, device: &PhysicalId) -> BoxFuture<'_, Result<Option<Vec<u8>>, PersistenceError>> {
        let path = self.path_for(device);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || match fs::read(&path) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(PersistenceError::Io(e)),
            })
            .await
            .map_err(|e| PersistenceError::Io(std::io::Error::other(e.to_string())))?
        })
    }

    fn write(&self, device: &PhysicalId, bytes: Vec<u8>) -> BoxFuture<'_, Result<(), PersistenceError>> {
        let path = self.path_for(device);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
                .await
                .map_err(|e| std::io::Error::other(e.to_string()))??;
            Ok(())
        })
    }

    fn remove(&self, device: &PhysicalId) -> BoxFuture<'_, Result<bool, PersistenceError>> {
        let path = self.path_for(device);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || match fs::remove_file(&path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(PersistenceError::Io(e)),
            })
            .await
            .map_err(|e| PersistenceError::Io(std::io::Error::other(e.to_string())))?
        })
    }
}

/// Write via temp file, fsync, rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp = path.with_extension(TEMP_EXTENSION);
    {
        let mut file = File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    // Persist the rename itself
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::new(temp.path().join("devices"));
        let device = PhysicalId::new("living-room");

        assert!(storage.read(&device).await.unwrap().is_none());
        storage.write(&device, b"{\"v\":1}".to_vec()).await.unwrap();

        let path = storage.path_for(&device);
        assert!(path.ends_with("living-room.json"));
        assert!(path.exists());
        assert_eq!(
            storage.read(&device).await.unwrap(),
            Some(b"{\"v\":1}".to_vec())
        );
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::new(temp.path());
        let device = PhysicalId::new("unit");

        storage.write(&device, b"first".to_vec()).await.unwrap();
        storage.write(&device, b"second".to_vec()).await.unwrap();

        assert_eq!(storage.read(&device).await.unwrap(), Some(b"second".to_vec()));
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::new(temp.path());
        let device = PhysicalId::new("unit");

        assert!(!storage.remove(&device).await.unwrap());
        storage.write(&device, b"x".to_vec()).await.unwrap();
        assert!(storage.remove(&device).await.unwrap());
        assert!(storage.read(&device).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookalike_identifiers_use_separate_files() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::new(temp.path());
        let colon = PhysicalId::new("aa:bb:cc");
        let underscore = PhysicalId::new("aa_bb_cc");

        assert_ne!(storage.path_for(&colon), storage.path_for(&underscore));
        storage.write(&colon, b"colon".to_vec()).await.unwrap();
        assert!(storage.read(&underscore).await.unwrap().is_none());

        storage.write(&underscore, b"underscore".to_vec()).await.unwrap();
        assert_eq!(storage.read(&colon).await.unwrap(), Some(b"colon".to_vec()));
    }

    #[tokio::test]
    async fn test_unsafe_identifier_stays_in_directory() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::new(temp.path().join("devices"));
        let device = PhysicalId::new("../escape");

        storage.write(&device, b"x".to_vec()).await.unwrap();
        assert!(storage.path_for(&device).starts_with(temp.path().join("devices")));
        assert!(!temp.path().join("escape.json").exists());
    }
}
