//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// File names of the three persisted registries, relative to the data dir.
pub mod files {
    pub const MUTED_USERS: &str = "muted_users.json";
    pub const BLACKLIST: &str = "blacklist.json";
    pub const BANNED_IMAGES: &str = "banned_images.json";
}

/// Commands that trigger heavy downloads and bill the hourly quota.
const DEFAULT_DOWNLOAD_COMMANDS: &[&str] = &[
    "!musica", "!spotify", "!video", "!ytmp3", "!tiktok", "!insta", "!tw",
];

/// Top-level moderation configuration.
#[derive(Debug, Clone)]
pub struct GuardianConfig {
    /// Directory holding the registry files.
    pub data_dir: PathBuf,
    /// Marker that makes the first token of a message a command.
    pub command_prefix: String,
    /// Full command names (prefix included) that count as downloads.
    pub download_commands: Vec<String>,
    /// Identities allowed to run moderator commands. Empty or `*` = everyone.
    pub moderators: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub humanize: HumanizeConfig,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            command_prefix: "!".to_string(),
            download_commands: DEFAULT_DOWNLOAD_COMMANDS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            moderators: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            humanize: HumanizeConfig::default(),
        }
    }
}

impl GuardianConfig {
    /// Build config from environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("GUARDIAN_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(prefix) = std::env::var("GUARDIAN_COMMAND_PREFIX") {
            let prefix = prefix.trim().to_string();
            if prefix.is_empty() || prefix.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidValue {
                    key: "GUARDIAN_COMMAND_PREFIX".into(),
                    message: "must be a non-empty token without whitespace".into(),
                });
            }
            // Keep download command names in sync with the new marker.
            config.download_commands = config
                .download_commands
                .iter()
                .map(|c| format!("{prefix}{}", c.trim_start_matches('!')))
                .collect();
            config.command_prefix = prefix;
        }

        config.moderators = std::env::var("GUARDIAN_MODERATORS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if let Ok(value) = std::env::var("GUARDIAN_HUMANIZE") {
            match value.trim().to_lowercase().as_str() {
                "off" | "0" | "false" => config.humanize = HumanizeConfig::instant(),
                "on" | "1" | "true" => {}
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "GUARDIAN_HUMANIZE".into(),
                        message: format!("expected on/off, got {other:?}"),
                    });
                }
            }
        }

        Ok(config)
    }

    /// Path of a registry file inside the data dir.
    pub fn registry_path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    /// Whether the command `name` (prefix included) bills the download quota.
    /// Case-insensitive, like moderator command names.
    pub fn is_download_command(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.download_commands.iter().any(|c| c.to_lowercase() == name)
    }

    /// Whether `identity` may run moderator commands.
    pub fn is_moderator(&self, identity: &str) -> bool {
        self.moderators.is_empty() || self.moderators.iter().any(|m| m == "*" || m == identity)
    }
}

/// Per-identity command quotas.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub command_window: Duration,
    pub max_commands_per_window: u32,
    pub download_window: Duration,
    pub max_downloads_per_window: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            command_window: Duration::from_secs(60),
            max_commands_per_window: 5,
            download_window: Duration::from_secs(3600),
            max_downloads_per_window: 10,
        }
    }
}

/// Randomised response delays.
#[derive(Debug, Clone)]
pub struct HumanizeConfig {
    pub min_reply_delay: Duration,
    pub max_reply_delay: Duration,
    pub min_typing: Duration,
    pub max_typing: Duration,
}

impl Default for HumanizeConfig {
    fn default() -> Self {
        Self {
            min_reply_delay: Duration::from_millis(1500),
            max_reply_delay: Duration::from_millis(4000),
            min_typing: Duration::from_millis(1000),
            max_typing: Duration::from_millis(3000),
        }
    }
}

impl HumanizeConfig {
    /// No waiting at all (tests, local runs).
    pub fn instant() -> Self {
        Self {
            min_reply_delay: Duration::ZERO,
            max_reply_delay: Duration::ZERO,
            min_typing: Duration::ZERO,
            max_typing: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let config = GuardianConfig::default();
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.rate_limit.max_commands_per_window, 5);
        assert_eq!(config.rate_limit.max_downloads_per_window, 10);
        assert_eq!(config.rate_limit.command_window, Duration::from_secs(60));
        assert_eq!(config.rate_limit.download_window, Duration::from_secs(3600));
        assert!(config.download_commands.iter().any(|c| c == "!ytmp3"));
    }

    #[test]
    fn download_commands_ignore_case() {
        let config = GuardianConfig::default();
        assert!(config.is_download_command("!ytmp3"));
        assert!(config.is_download_command("!YtMp3"));
        assert!(!config.is_download_command("!mute"));
        assert!(!config.is_download_command("ytmp3"));
    }

    #[test]
    fn empty_moderator_list_allows_everyone() {
        let config = GuardianConfig::default();
        assert!(config.is_moderator("anyone"));
    }

    #[test]
    fn moderator_list_restricts() {
        let config = GuardianConfig {
            moderators: vec!["admin@c.us".into()],
            ..Default::default()
        };
        assert!(config.is_moderator("admin@c.us"));
        assert!(!config.is_moderator("user@c.us"));
    }

    #[test]
    fn wildcard_moderator_allows_everyone() {
        let config = GuardianConfig {
            moderators: vec!["*".into()],
            ..Default::default()
        };
        assert!(config.is_moderator("user@c.us"));
    }

    #[test]
    fn registry_path_joins_data_dir() {
        let config = GuardianConfig {
            data_dir: PathBuf::from("/tmp/guardian"),
            ..Default::default()
        };
        assert_eq!(
            config.registry_path(files::BLACKLIST),
            PathBuf::from("/tmp/guardian/blacklist.json")
        );
    }
}
