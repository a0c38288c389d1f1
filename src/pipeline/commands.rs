//! Command parsing and the external dispatch contract.

use async_trait::async_trait;

use crate::error::CommandError;
use crate::pipeline::types::{Attachment, InboundMessage, ReplyContent};

/// A command extracted from a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// First token, prefix included (e.g. `!mute`).
    pub name: String,
    pub args: Vec<String>,
}

impl ParsedCommand {
    /// Parse `body` if its first token starts with `prefix`.
    pub fn parse(body: &str, prefix: &str) -> Option<Self> {
        let mut tokens = body.split_whitespace();
        let name = tokens.next()?;
        if !name.starts_with(prefix) {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            args: tokens.map(str::to_string).collect(),
        })
    }

    /// Command name without the prefix, lower-cased.
    pub fn bare_name(&self, prefix: &str) -> String {
        self.name
            .strip_prefix(prefix)
            .unwrap_or(&self.name)
            .to_lowercase()
    }

    /// Arguments from `from` onward, joined by single spaces.
    pub fn rest(&self, from: usize) -> String {
        self.args.get(from..).unwrap_or_default().join(" ")
    }
}

/// Everything an external handler gets for one allowed command.
pub struct CommandContext<'a> {
    pub message: &'a InboundMessage,
    pub command: &'a ParsedCommand,
    /// Attachment of the message being replied to, if any.
    pub quoted_attachment: Option<Attachment>,
}

/// External command handler (downloads, media effects, lookups, ...).
///
/// Only invoked after the rate-limit gate allowed the command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Produce a reply, or `None` to stay silent.
    async fn handle(&self, ctx: CommandContext<'_>) -> Result<Option<ReplyContent>, CommandError>;
}

/// Handler that knows no commands.
pub struct NoopCommandHandler;

#[async_trait]
impl CommandHandler for NoopCommandHandler {
    async fn handle(&self, _ctx: CommandContext<'_>) -> Result<Option<ReplyContent>, CommandError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_args() {
        let cmd = ParsedCommand::parse("!blacklist add bad   word", "!").unwrap();
        assert_eq!(cmd.name, "!blacklist");
        assert_eq!(cmd.args, vec!["add", "bad", "word"]);
        assert_eq!(cmd.rest(1), "bad word");
    }

    #[test]
    fn non_command_is_none() {
        assert!(ParsedCommand::parse("hello !world", "!").is_none());
        assert!(ParsedCommand::parse("", "!").is_none());
        assert!(ParsedCommand::parse("   ", "!").is_none());
    }

    #[test]
    fn custom_prefix() {
        let cmd = ParsedCommand::parse("/Mute spam", "/").unwrap();
        assert_eq!(cmd.bare_name("/"), "mute");
    }

    #[test]
    fn rest_past_end_is_empty() {
        let cmd = ParsedCommand::parse("!mute", "!").unwrap();
        assert_eq!(cmd.rest(0), "");
        assert_eq!(cmd.rest(3), "");
    }
}
