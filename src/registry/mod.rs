//! Persistent moderation registries.
//!
//! Each registry owns its collection and the JSON file backing it. Every
//! mutation runs read-modify-persist under the registry's own lock, so
//! concurrent callers are serialized and a successful return means the
//! whole collection is on disk.

pub mod banned_images;
pub mod blacklist;
pub mod mute;
pub mod store;

pub use banned_images::BannedImageRegistry;
pub use blacklist::BlacklistRegistry;
pub use mute::{MuteRegistry, MutedIdentity};
pub use store::JsonFileStore;

use std::sync::Arc;

use crate::config::{GuardianConfig, files};

/// The three registries, opened from the configured data dir.
#[derive(Clone)]
pub struct Registries {
    pub mute: Arc<MuteRegistry>,
    pub blacklist: Arc<BlacklistRegistry>,
    pub banned_images: Arc<BannedImageRegistry>,
}

impl Registries {
    pub async fn open(config: &GuardianConfig) -> Self {
        Self {
            mute: Arc::new(MuteRegistry::open(config.registry_path(files::MUTED_USERS)).await),
            blacklist: Arc::new(
                BlacklistRegistry::open(config.registry_path(files::BLACKLIST)).await,
            ),
            banned_images: Arc::new(
                BannedImageRegistry::open(config.registry_path(files::BANNED_IMAGES)).await,
            ),
        }
    }
}
