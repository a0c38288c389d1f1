//! Error types for Chat Guardian.

use std::path::PathBuf;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence failures for the JSON-backed registries.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Contract violations and persistence failures of registry mutations.
///
/// On `Storage`, the in-memory change has already been applied and is not
/// rolled back; memory and disk diverge until the next successful write.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Identity {identity} is already muted")]
    AlreadyMuted { identity: String },

    #[error("Identity {identity} is not muted")]
    NotMuted { identity: String },

    #[error("Phrase \"{phrase}\" is already blacklisted")]
    Duplicate { phrase: String },

    #[error("Blacklist phrases cannot be empty")]
    EmptyPhrase,

    #[error("Phrase \"{phrase}\" is not blacklisted")]
    NotFound { phrase: String },

    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Unparseable media bytes.
#[derive(Debug, thiserror::Error)]
#[error("Failed to decode image: {reason}")]
pub struct DecodeError {
    pub reason: String,
}

impl From<image::ImageError> for DecodeError {
    fn from(e: image::ImageError) -> Self {
        Self {
            reason: e.to_string(),
        }
    }
}

/// NSFW classifier failures.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classifier unavailable: {0}")]
    Unavailable(String),

    #[error("Classification failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Failures at the messaging transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to delete message {message_id}: {reason}")]
    DeleteFailed { message_id: String, reason: String },

    #[error("Failed to send reply to {message_id}: {reason}")]
    SendFailed { message_id: String, reason: String },

    #[error("Failed to download attachment of {message_id}: {reason}")]
    DownloadFailed { message_id: String, reason: String },

    #[error("Lookup failed: {0}")]
    Lookup(String),
}

/// Failures reported by the external command handler.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Command {name} failed: {reason}")]
    Failed { name: String, reason: String },
}
