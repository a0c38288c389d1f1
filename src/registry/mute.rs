//! Mute registry: identities whose messages are purged on arrival.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use super::store::JsonFileStore;
use crate::error::RegistryError;

/// A muted sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutedIdentity {
    /// Opaque sender id.
    #[serde(alias = "userId")]
    pub identity: String,
    pub reason: String,
    pub muted_at: DateTime<Utc>,
}

/// Set of muted identities, kept in insertion order.
pub struct MuteRegistry {
    store: JsonFileStore<MutedIdentity>,
    entries: Mutex<Vec<MutedIdentity>>,
}

impl MuteRegistry {
    /// Open the registry, loading whatever is on disk.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonFileStore::new(path);
        let entries = store.load().await;
        info!(path = %store.path().display(), count = entries.len(), "Mute registry loaded");
        Self {
            store,
            entries: Mutex::new(entries),
        }
    }

    pub async fn is_muted(&self, identity: &str) -> bool {
        self.entries
            .lock()
            .await
            .iter()
            .any(|m| m.identity == identity)
    }

    /// Mute `identity`. Fails with `AlreadyMuted` if present.
    pub async fn mute(
        &self,
        identity: &str,
        reason: &str,
    ) -> Result<MutedIdentity, RegistryError> {
        let mut entries = self.entries.lock().await;
        if entries.iter().any(|m| m.identity == identity) {
            return Err(RegistryError::AlreadyMuted {
                identity: identity.to_string(),
            });
        }

        let entry = MutedIdentity {
            identity: identity.to_string(),
            reason: reason.to_string(),
            muted_at: Utc::now(),
        };
        entries.push(entry.clone());
        self.store.save(&entries).await?;

        info!(identity = %identity, reason = %reason, "Identity muted");
        Ok(entry)
    }

    /// Unmute `identity`. Fails with `NotMuted` if absent.
    pub async fn unmute(&self, identity: &str) -> Result<MutedIdentity, RegistryError> {
        let mut entries = self.entries.lock().await;
        let index = entries
            .iter()
            .position(|m| m.identity == identity)
            .ok_or_else(|| RegistryError::NotMuted {
                identity: identity.to_string(),
            })?;

        let removed = entries.remove(index);
        self.store.save(&entries).await?;

        info!(identity = %identity, "Identity unmuted");
        Ok(removed)
    }

    /// Drop every entry. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize, RegistryError> {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        self.store.save(&entries).await?;

        info!(count, "Mute registry cleared");
        Ok(count)
    }

    /// Entries in insertion order.
    pub async fn list(&self) -> Vec<MutedIdentity> {
        self.entries.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn registry() -> (MuteRegistry, TempDir) {
        let dir = TempDir::new().unwrap();
        let reg = MuteRegistry::open(dir.path().join("muted_users.json")).await;
        (reg, dir)
    }

    #[tokio::test]
    async fn mute_and_query() {
        let (reg, _dir) = registry().await;
        assert!(!reg.is_muted("u1").await);
        reg.mute("u1", "spam").await.unwrap();
        assert!(reg.is_muted("u1").await);
        assert!(!reg.is_muted("u2").await);
    }

    #[tokio::test]
    async fn double_mute_fails() {
        let (reg, _dir) = registry().await;
        reg.mute("u1", "spam").await.unwrap();
        let err = reg.mute("u1", "again").await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyMuted { .. }));
        assert_eq!(reg.list().await.len(), 1);
    }

    #[tokio::test]
    async fn unmute_absent_fails() {
        let (reg, _dir) = registry().await;
        let err = reg.unmute("ghost").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotMuted { .. }));
    }

    #[tokio::test]
    async fn list_keeps_insertion_order() {
        let (reg, _dir) = registry().await;
        reg.mute("c", "").await.unwrap();
        reg.mute("a", "").await.unwrap();
        reg.mute("b", "").await.unwrap();
        reg.unmute("a").await.unwrap();
        let ids: Vec<String> = reg.list().await.into_iter().map(|m| m.identity).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn mutations_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("muted_users.json");
        {
            let reg = MuteRegistry::open(&path).await;
            reg.mute("u1", "flood").await.unwrap();
            reg.mute("u2", "spam").await.unwrap();
            reg.unmute("u1").await.unwrap();
        }
        let reopened = MuteRegistry::open(&path).await;
        let entries = reopened.list().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].identity, "u2");
        assert_eq!(entries[0].reason, "spam");
    }

    #[tokio::test]
    async fn clear_empties_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("muted_users.json");
        let reg = MuteRegistry::open(&path).await;
        reg.mute("u1", "").await.unwrap();
        reg.mute("u2", "").await.unwrap();
        assert_eq!(reg.clear().await.unwrap(), 2);
        assert!(reg.list().await.is_empty());
        assert!(MuteRegistry::open(&path).await.list().await.is_empty());
    }

    #[tokio::test]
    async fn loads_legacy_user_id_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("muted_users.json");
        std::fs::write(
            &path,
            r#"[{"userId": "123@c.us", "reason": "flood", "mutedAt": "2024-05-01T10:00:00.000Z"}]"#,
        )
        .unwrap();
        let reg = MuteRegistry::open(&path).await;
        assert!(reg.is_muted("123@c.us").await);
    }

    #[tokio::test]
    async fn storage_failure_keeps_memory_change() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let reg = MuteRegistry::open(blocker.join("muted_users.json")).await;

        let err = reg.mute("u1", "spam").await.unwrap_err();
        assert!(matches!(err, RegistryError::Storage(_)));
        // Not rolled back.
        assert!(reg.is_muted("u1").await);
    }
}
