//! Built-in moderator commands: the only path that mutates the registries.
//!
//! - `!blacklist [add <phrase> | remove <phrase> | remove #<n> | clear]`
//! - `!banimage [list | remove <n> | clear]`, or reply to an image to ban it
//! - `!mute [reason]` / `!mute unmute` replying to a message, `!mute list`, `!mute clear`

use std::fmt::Write as _;

use tracing::{error, info, warn};

use crate::config::GuardianConfig;
use crate::error::RegistryError;
use crate::phash;
use crate::pipeline::commands::ParsedCommand;
use crate::pipeline::types::{InboundMessage, Transport};
use crate::registry::Registries;

const DEFAULT_MUTE_REASON: &str = "no reason given";

const BLACKLIST_USAGE: &str = "Usage:\n!blacklist - list phrases\n!blacklist add <phrase>\n!blacklist remove <phrase | #n>\n!blacklist clear";
const BANIMAGE_USAGE: &str = "❌ Reply to an image with !banimage to ban it\n\nCommands:\n!banimage list - show count\n!banimage remove <#> - unban\n!banimage clear - unban all";
const MUTE_USAGE: &str = "❌ Reply to someone's message with !mute to silence them\n\nCommands:\n!mute list - show all\n!mute unmute - unmute (reply to a message)\n!mute clear - unmute all";

/// Which registry a moderator command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeratorCommandKind {
    Blacklist,
    BanImage,
    Mute,
}

impl ModeratorCommandKind {
    pub fn from_command(command: &ParsedCommand, prefix: &str) -> Option<Self> {
        match command.bare_name(prefix).as_str() {
            "blacklist" => Some(Self::Blacklist),
            "banimage" => Some(Self::BanImage),
            "mute" => Some(Self::Mute),
            _ => None,
        }
    }
}

/// Executes moderator commands against the registries.
pub struct ModeratorCommands {
    config: GuardianConfig,
    registries: Registries,
}

impl ModeratorCommands {
    pub fn new(config: GuardianConfig, registries: Registries) -> Self {
        Self { config, registries }
    }

    /// Run `command` if it is a moderator command and return the reply text.
    ///
    /// Returns `None` for any other command so the caller can dispatch it
    /// elsewhere.
    pub async fn execute(
        &self,
        message: &InboundMessage,
        command: &ParsedCommand,
        transport: &dyn Transport,
    ) -> Option<String> {
        let kind = ModeratorCommandKind::from_command(command, &self.config.command_prefix)?;

        if !self.config.is_moderator(&message.sender) {
            warn!(sender = %message.sender, command = %command.name, "Moderator command refused");
            return Some("❌ Only moderators can use this command".into());
        }

        info!(sender = %message.sender, command = %command.name, "Moderator command");
        let reply = match kind {
            ModeratorCommandKind::Blacklist => self.blacklist(command).await,
            ModeratorCommandKind::BanImage => self.ban_image(message, command, transport).await,
            ModeratorCommandKind::Mute => self.mute(message, command, transport).await,
        };
        Some(reply)
    }

    async fn blacklist(&self, command: &ParsedCommand) -> String {
        let registry = &self.registries.blacklist;
        let sub = command.args.first().map(|s| s.to_lowercase());

        match (sub.as_deref(), command.args.len()) {
            (None, _) => {
                let phrases = registry.list().await;
                if phrases.is_empty() {
                    return "📋 The blacklist is empty".into();
                }
                let mut out = format!("📋 *BLACKLIST* ({} phrases):\n", phrases.len());
                for (i, p) in phrases.iter().enumerate() {
                    let _ = writeln!(out, "#{} {}", i + 1, p);
                }
                out
            }
            (Some("add"), n) if n >= 2 => {
                let phrase = command.rest(1);
                match registry.add(&phrase).await {
                    Ok(()) => format!("✅ \"{phrase}\" added to the blacklist"),
                    Err(RegistryError::Duplicate { .. }) => {
                        format!("❌ \"{phrase}\" is already blacklisted")
                    }
                    Err(RegistryError::EmptyPhrase) => BLACKLIST_USAGE.into(),
                    Err(e) => storage_failure(e),
                }
            }
            (Some("remove"), n) if n >= 2 => {
                // `#n` addresses by listed position, since typing a banned
                // phrase gets the command itself deleted.
                let phrase = match position_arg(&command.args[1]) {
                    Some(pos) if command.args.len() == 2 => {
                        match registry.list().await.into_iter().nth(pos) {
                            Some(p) => p,
                            None => return "❌ Invalid index".into(),
                        }
                    }
                    _ => command.rest(1),
                };
                match registry.remove(&phrase).await {
                    Ok(()) => format!("✅ \"{phrase}\" removed from the blacklist"),
                    Err(RegistryError::NotFound { .. }) => {
                        format!("❌ \"{phrase}\" is not in the blacklist")
                    }
                    Err(e) => storage_failure(e),
                }
            }
            (Some("clear"), _) => match registry.clear().await {
                Ok(_) => "✅ Blacklist cleared".into(),
                Err(e) => storage_failure(e),
            },
            _ => BLACKLIST_USAGE.into(),
        }
    }

    async fn ban_image(
        &self,
        message: &InboundMessage,
        command: &ParsedCommand,
        transport: &dyn Transport,
    ) -> String {
        let registry = &self.registries.banned_images;
        let sub = command.args.first().map(|s| s.to_lowercase());

        match sub.as_deref() {
            Some("list") => {
                let count = registry.len().await;
                if count == 0 {
                    "📋 No banned images".into()
                } else {
                    format!("🚫 *BANNED IMAGES* ({count})\n\nUse !banimage remove <#> to unban")
                }
            }
            Some("clear") => match registry.clear().await {
                Ok(_) => "✅ Banned image list cleared".into(),
                Err(e) => storage_failure(e),
            },
            Some("remove") => {
                let Some(index) = command
                    .args
                    .get(1)
                    .and_then(|a| a.trim_start_matches('#').parse::<usize>().ok())
                else {
                    return "❌ Invalid index".into();
                };
                match registry.remove(index).await {
                    Ok(_) => format!("✅ Image #{index} removed from the banned list"),
                    Err(RegistryError::IndexOutOfRange { .. }) => "❌ Invalid index".into(),
                    Err(e) => storage_failure(e),
                }
            }
            _ => self.ban_quoted_image(message, transport).await,
        }
    }

    async fn ban_quoted_image(&self, message: &InboundMessage, transport: &dyn Transport) -> String {
        let quoted = match transport.quoted_message(&message.id).await {
            Ok(Some(q)) if q.media.is_some() => q,
            Ok(_) => return BANIMAGE_USAGE.into(),
            Err(e) => {
                warn!(id = %message.id, error = %e, "Failed to fetch quoted message");
                return BANIMAGE_USAGE.into();
            }
        };

        let attachment = match transport.download_attachment(&quoted.id).await {
            Ok(a) => a,
            Err(e) => {
                warn!(id = %quoted.id, error = %e, "Failed to download image to ban");
                return "❌ Could not process image".into();
            }
        };
        if !attachment.is_image() {
            return "❌ Only images can be banned".into();
        }

        let hash = match phash::fingerprint_blocking(attachment.data).await {
            Ok(h) => h,
            Err(e) => {
                warn!(id = %quoted.id, error = %e, "Failed to fingerprint image to ban");
                return "❌ Could not process image".into();
            }
        };

        match self.registries.banned_images.add(hash).await {
            Ok(index) => format!(
                "✅ Image banned (#{index})\n\nAny similar image will be removed automatically."
            ),
            Err(e) => storage_failure(e),
        }
    }

    async fn mute(
        &self,
        message: &InboundMessage,
        command: &ParsedCommand,
        transport: &dyn Transport,
    ) -> String {
        let registry = &self.registries.mute;
        let sub = command.args.first().map(|s| s.to_lowercase());

        match sub.as_deref() {
            Some("list") => {
                let entries = registry.list().await;
                if entries.is_empty() {
                    return "📋 No muted users".into();
                }
                let mut out = format!("🔇 *MUTED USERS* ({}):\n\n", entries.len());
                for (i, m) in entries.iter().enumerate() {
                    let _ = write!(out, "{}. {}\n   Reason: {}\n\n", i + 1, m.identity, m.reason);
                }
                out
            }
            Some("clear") => match registry.clear().await {
                Ok(_) => "✅ Muted user list cleared".into(),
                Err(e) => storage_failure(e),
            },
            _ => {
                let target = match transport.quoted_message(&message.id).await {
                    Ok(Some(q)) => q.sender,
                    Ok(None) => return MUTE_USAGE.into(),
                    Err(e) => {
                        warn!(id = %message.id, error = %e, "Failed to fetch quoted message");
                        return MUTE_USAGE.into();
                    }
                };

                if matches!(sub.as_deref(), Some("unmute") | Some("remove")) {
                    return match registry.unmute(&target).await {
                        Ok(_) => "✅ User unmuted".into(),
                        Err(RegistryError::NotMuted { .. }) => "❌ This user is not muted".into(),
                        Err(e) => storage_failure(e),
                    };
                }

                let reason = match command.rest(0) {
                    r if r.is_empty() => DEFAULT_MUTE_REASON.to_string(),
                    r => r,
                };
                match registry.mute(&target, &reason).await {
                    Ok(_) => "🔇 User muted\n\nAll their messages will be removed automatically.".into(),
                    Err(RegistryError::AlreadyMuted { .. }) => "❌ This user is already muted".into(),
                    Err(e) => storage_failure(e),
                }
            }
        }
    }
}

/// Parse a `#n` argument (1-based) into a 0-based position.
fn position_arg(arg: &str) -> Option<usize> {
    arg.strip_prefix('#')?.parse::<usize>().ok()?.checked_sub(1)
}

fn storage_failure(e: RegistryError) -> String {
    error!(error = %e, "Registry mutation failed");
    format!("❌ Could not save change: {e}")
}
