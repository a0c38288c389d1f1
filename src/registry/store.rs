//! Whole-file JSON storage for registry collections.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::StorageError;

/// A JSON array of `T` persisted as a single file.
///
/// Loading never fails: a missing file is an empty collection and a
/// malformed one degrades to empty with a warning.
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the collection once at startup.
    pub async fn load(&self) -> Vec<T> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No registry file, starting empty");
                return Vec::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read registry, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(items) => items,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Malformed registry, starting empty");
                Vec::new()
            }
        }
    }

    /// Write the full collection and fsync before returning.
    ///
    /// Writes to a sibling temp file and renames it over the target, so a
    /// crash mid-write leaves the previous contents intact.
    pub async fn save(&self, items: &[T]) -> Result<(), StorageError> {
        let json =
            serde_json::to_string_pretty(items).map_err(|source| StorageError::Serialization {
                path: self.path.clone(),
                source,
            })?;

        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).await.map_err(io_err)?;
        file.write_all(json.as_bytes()).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;

        debug!(path = %self.path.display(), count = items.len(), "Registry persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store: JsonFileStore<String> = JsonFileStore::new(dir.path().join("nope.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store: JsonFileStore<String> = JsonFileStore::new(&path);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("list.json"));
        store
            .save(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let loaded: Vec<String> = store.load().await;
        assert_eq!(loaded, vec!["a", "b"]);
        assert!(!dir.path().join("list.json.tmp").exists());
    }

    #[tokio::test]
    async fn save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/deeper/list.json"));
        store.save(&["x".to_string()]).await.unwrap();
        assert!(dir.path().join("nested/deeper/list.json").exists());
    }

    #[tokio::test]
    async fn save_into_unwritable_location_fails() {
        let dir = TempDir::new().unwrap();
        // A regular file where a directory is expected.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = JsonFileStore::new(blocker.join("list.json"));
        let err = store.save(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
