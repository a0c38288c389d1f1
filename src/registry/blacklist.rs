//! Blacklist registry: banned phrases matched by substring.

use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::info;

use super::store::JsonFileStore;
use crate::error::RegistryError;

/// Ordered list of banned phrases.
///
/// Matching is a lower-cased substring scan without word boundaries, so a
/// short phrase also matches inside longer words.
pub struct BlacklistRegistry {
    store: JsonFileStore<String>,
    phrases: Mutex<Vec<String>>,
}

impl BlacklistRegistry {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonFileStore::new(path);
        let phrases = store.load().await;
        info!(path = %store.path().display(), count = phrases.len(), "Blacklist loaded");
        Self {
            store,
            phrases: Mutex::new(phrases),
        }
    }

    /// First phrase (insertion order) contained in `text`, case-insensitively.
    ///
    /// Blank phrases never match; one can still arrive from a hand-edited file.
    pub async fn check(&self, text: &str) -> Option<String> {
        let lowered = text.to_lowercase();
        self.phrases
            .lock()
            .await
            .iter()
            .filter(|p| !p.trim().is_empty())
            .find(|p| lowered.contains(&p.to_lowercase()))
            .cloned()
    }

    /// Append a phrase. The duplicate check is exact, not case-insensitive.
    pub async fn add(&self, phrase: &str) -> Result<(), RegistryError> {
        if phrase.trim().is_empty() {
            return Err(RegistryError::EmptyPhrase);
        }
        let mut phrases = self.phrases.lock().await;
        if phrases.iter().any(|p| p == phrase) {
            return Err(RegistryError::Duplicate {
                phrase: phrase.to_string(),
            });
        }
        phrases.push(phrase.to_string());
        self.store.save(&phrases).await?;

        info!(phrase = %phrase, "Phrase blacklisted");
        Ok(())
    }

    pub async fn remove(&self, phrase: &str) -> Result<(), RegistryError> {
        let mut phrases = self.phrases.lock().await;
        let index = phrases
            .iter()
            .position(|p| p == phrase)
            .ok_or_else(|| RegistryError::NotFound {
                phrase: phrase.to_string(),
            })?;
        phrases.remove(index);
        self.store.save(&phrases).await?;

        info!(phrase = %phrase, "Phrase removed from blacklist");
        Ok(())
    }

    pub async fn clear(&self) -> Result<usize, RegistryError> {
        let mut phrases = self.phrases.lock().await;
        let count = phrases.len();
        phrases.clear();
        self.store.save(&phrases).await?;

        info!(count, "Blacklist cleared");
        Ok(count)
    }

    pub async fn list(&self) -> Vec<String> {
        self.phrases.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn registry() -> (BlacklistRegistry, TempDir) {
        let dir = TempDir::new().unwrap();
        let reg = BlacklistRegistry::open(dir.path().join("blacklist.json")).await;
        (reg, dir)
    }

    #[tokio::test]
    async fn check_is_case_insensitive() {
        let (reg, _dir) = registry().await;
        reg.add("Casino").await.unwrap();
        assert_eq!(reg.check("join my CASINO now").await.as_deref(), Some("Casino"));
        assert!(reg.check("hello there").await.is_none());
    }

    #[tokio::test]
    async fn check_matches_inside_words() {
        let (reg, _dir) = registry().await;
        reg.add("ass").await.unwrap();
        assert_eq!(reg.check("classic").await.as_deref(), Some("ass"));
    }

    #[tokio::test]
    async fn first_match_in_insertion_order_wins() {
        let (reg, _dir) = registry().await;
        reg.add("spam").await.unwrap();
        reg.add("spam link").await.unwrap();
        assert_eq!(reg.check("a spam link").await.as_deref(), Some("spam"));
    }

    #[tokio::test]
    async fn duplicate_check_is_exact() {
        let (reg, _dir) = registry().await;
        reg.add("word").await.unwrap();
        let err = reg.add("word").await.unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { .. }));
        // Different case is a different entry.
        reg.add("WORD").await.unwrap();
        assert_eq!(reg.list().await, vec!["word", "WORD"]);
    }

    #[tokio::test]
    async fn blank_phrases_are_rejected() {
        let (reg, _dir) = registry().await;
        assert!(matches!(reg.add("").await, Err(RegistryError::EmptyPhrase)));
        assert!(matches!(reg.add("   ").await, Err(RegistryError::EmptyPhrase)));
        assert!(reg.list().await.is_empty());
    }

    #[tokio::test]
    async fn blank_phrase_on_disk_matches_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blacklist.json");
        std::fs::write(&path, r#"["", " ", "casino"]"#).unwrap();

        let reg = BlacklistRegistry::open(&path).await;
        assert!(reg.check("good morning").await.is_none());
        assert!(reg.check("!blacklist clear").await.is_none());
        assert_eq!(reg.check("casino night").await.as_deref(), Some("casino"));
    }

    #[tokio::test]
    async fn remove_missing_fails() {
        let (reg, _dir) = registry().await;
        let err = reg.remove("nothing").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn remove_and_clear_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blacklist.json");
        let reg = BlacklistRegistry::open(&path).await;
        reg.add("one").await.unwrap();
        reg.add("two").await.unwrap();
        reg.remove("one").await.unwrap();
        assert_eq!(BlacklistRegistry::open(&path).await.list().await, vec!["two"]);

        assert_eq!(reg.clear().await.unwrap(), 1);
        assert!(BlacklistRegistry::open(&path).await.list().await.is_empty());
    }
}
