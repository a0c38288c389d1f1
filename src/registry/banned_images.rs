//! Banned-image registry: ordered fingerprints of images moderators banned.

use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::info;

use super::store::JsonFileStore;
use crate::error::RegistryError;
use crate::phash::{self, BAN_SIMILARITY_THRESHOLD, Fingerprint};

/// A banned fingerprint close enough to a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct BanMatch {
    pub index: usize,
    pub similarity: f64,
}

/// Fingerprints in insertion order; positions are the public handle for removal.
/// Duplicates are allowed.
pub struct BannedImageRegistry {
    store: JsonFileStore<Fingerprint>,
    hashes: Mutex<Vec<Fingerprint>>,
}

impl BannedImageRegistry {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonFileStore::new(path);
        let hashes = store.load().await;
        info!(path = %store.path().display(), count = hashes.len(), "Banned image registry loaded");
        Self {
            store,
            hashes: Mutex::new(hashes),
        }
    }

    /// Append a fingerprint and return its index.
    pub async fn add(&self, hash: Fingerprint) -> Result<usize, RegistryError> {
        let mut hashes = self.hashes.lock().await;
        hashes.push(hash);
        let index = hashes.len() - 1;
        self.store.save(&hashes).await?;

        info!(index, "Image fingerprint banned");
        Ok(index)
    }

    /// Remove the fingerprint at `index`.
    pub async fn remove(&self, index: usize) -> Result<Fingerprint, RegistryError> {
        let mut hashes = self.hashes.lock().await;
        if index >= hashes.len() {
            return Err(RegistryError::IndexOutOfRange {
                index,
                len: hashes.len(),
            });
        }
        let removed = hashes.remove(index);
        self.store.save(&hashes).await?;

        info!(index, "Image fingerprint unbanned");
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<usize, RegistryError> {
        let mut hashes = self.hashes.lock().await;
        let count = hashes.len();
        hashes.clear();
        self.store.save(&hashes).await?;

        info!(count, "Banned image registry cleared");
        Ok(count)
    }

    pub async fn list(&self) -> Vec<Fingerprint> {
        self.hashes.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.hashes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.hashes.lock().await.is_empty()
    }

    /// First entry whose similarity to `candidate` meets the ban threshold.
    pub async fn find_match(&self, candidate: &Fingerprint) -> Option<BanMatch> {
        self.hashes
            .lock()
            .await
            .iter()
            .enumerate()
            .map(|(index, banned)| BanMatch {
                index,
                similarity: phash::similarity(candidate, banned),
            })
            .find(|m| m.similarity >= BAN_SIMILARITY_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn registry() -> (BannedImageRegistry, TempDir) {
        let dir = TempDir::new().unwrap();
        let reg = BannedImageRegistry::open(dir.path().join("banned_images.json")).await;
        (reg, dir)
    }

    #[tokio::test]
    async fn add_returns_sequential_indices() {
        let (reg, _dir) = registry().await;
        assert_eq!(reg.add(Fingerprint::from_bits(1)).await.unwrap(), 0);
        assert_eq!(reg.add(Fingerprint::from_bits(1)).await.unwrap(), 1);
        assert_eq!(reg.len().await, 2);
    }

    #[tokio::test]
    async fn remove_by_position() {
        let (reg, _dir) = registry().await;
        reg.add(Fingerprint::from_bits(1)).await.unwrap();
        reg.add(Fingerprint::from_bits(2)).await.unwrap();
        reg.add(Fingerprint::from_bits(3)).await.unwrap();

        let removed = reg.remove(1).await.unwrap();
        assert_eq!(removed, Fingerprint::from_bits(2));
        assert_eq!(
            reg.list().await,
            vec![Fingerprint::from_bits(1), Fingerprint::from_bits(3)]
        );
    }

    #[tokio::test]
    async fn remove_out_of_range_fails() {
        let (reg, _dir) = registry().await;
        reg.add(Fingerprint::from_bits(1)).await.unwrap();
        let err = reg.remove(5).await.unwrap_err();
        assert!(matches!(err, RegistryError::IndexOutOfRange { index: 5, len: 1 }));
    }

    #[tokio::test]
    async fn find_match_respects_threshold() {
        let (reg, _dir) = registry().await;
        reg.add(Fingerprint::from_bits(0)).await.unwrap();

        // 5 bits off: 92.2%
        let close = Fingerprint::from_bits(0b11111);
        let m = reg.find_match(&close).await.unwrap();
        assert_eq!(m.index, 0);
        assert!(m.similarity > 92.0);

        // 32 bits off: 50%
        let far = Fingerprint::from_bits(0xFFFF_FFFF);
        assert!(reg.find_match(&far).await.is_none());
    }

    /// Flip the lowest `n` bits.
    fn flipped(bits: u64, n: u32) -> Fingerprint {
        Fingerprint::from_bits(bits ^ ((1u64 << n) - 1))
    }

    #[tokio::test]
    async fn find_match_threshold_is_inclusive() {
        let (reg, _dir) = registry().await;
        let banned = 0xAAAA_5555_AAAA_5555;
        reg.add(Fingerprint::from_bits(banned)).await.unwrap();

        // 9 bits off: 85.94%, 10 bits off: 84.38%.
        let nine = reg.find_match(&flipped(banned, 9)).await.unwrap();
        assert!(nine.similarity >= BAN_SIMILARITY_THRESHOLD);
        assert!(reg.find_match(&flipped(banned, 10)).await.is_none());
    }

    #[tokio::test]
    async fn find_match_returns_first_qualifying() {
        let (reg, _dir) = registry().await;
        reg.add(Fingerprint::from_bits(u64::MAX)).await.unwrap();
        reg.add(Fingerprint::from_bits(0b1)).await.unwrap();
        reg.add(Fingerprint::from_bits(0)).await.unwrap();
        let m = reg.find_match(&Fingerprint::from_bits(0)).await.unwrap();
        assert_eq!(m.index, 1);
    }

    #[tokio::test]
    async fn persists_as_binary_strings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("banned_images.json");
        let reg = BannedImageRegistry::open(&path).await;
        reg.add(Fingerprint::from_bits(0b101)).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed[0].len(), 64);
        assert!(parsed[0].ends_with("101"));

        let reopened = BannedImageRegistry::open(&path).await;
        assert_eq!(reopened.list().await, vec![Fingerprint::from_bits(0b101)]);
    }

    #[tokio::test]
    async fn clear_empties() {
        let (reg, _dir) = registry().await;
        reg.add(Fingerprint::from_bits(7)).await.unwrap();
        assert_eq!(reg.clear().await.unwrap(), 1);
        assert!(reg.is_empty().await);
    }
}
