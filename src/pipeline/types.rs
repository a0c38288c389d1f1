//! Shared types for the moderation pipeline.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::throttle::DenyReason;

// ── References ──────────────────────────────────────────────────────

/// Transport-native message id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef(pub String);

/// Transport-native chat id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef(pub String);

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Inbound message ─────────────────────────────────────────────────

/// Kind of attachment carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Sticker,
    Video,
    Audio,
    Document,
    Other,
}

impl MediaKind {
    /// Can be fingerprinted.
    pub fn is_image_like(&self) -> bool {
        matches!(self, Self::Image | Self::Sticker)
    }

    /// Eligible for classification.
    pub fn is_still_image(&self) -> bool {
        matches!(self, Self::Image)
    }
}

/// Attachment metadata known before download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub kind: MediaKind,
    pub mime_type: Option<String>,
    /// Ephemeral "view once" content.
    #[serde(default)]
    pub view_once: bool,
}

impl MediaInfo {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            mime_type: None,
            view_once: false,
        }
    }

    pub fn view_once(mut self) -> Self {
        self.view_once = true;
        self
    }
}

/// One inbound event from the group channel.
///
/// Transports convert their native format into this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: MessageRef,
    pub channel: ChannelRef,
    /// Sender identity (author in groups, chat id in direct chats).
    pub sender: String,
    pub body: String,
    /// Sent by the account the pipeline runs as.
    #[serde(default)]
    pub from_me: bool,
    pub media: Option<MediaInfo>,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn text(id: &str, channel: &str, sender: &str, body: &str) -> Self {
        Self {
            id: MessageRef(id.to_string()),
            channel: ChannelRef(channel.to_string()),
            sender: sender.to_string(),
            body: body.to_string(),
            from_me: false,
            media: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_media(mut self, media: MediaInfo) -> Self {
        self.media = Some(media);
        self
    }
}

/// The message an inbound message replies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedMessage {
    pub id: MessageRef,
    pub sender: String,
    pub media: Option<MediaInfo>,
}

/// Downloaded attachment bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Content of an outbound reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyContent {
    Text(String),
    Media {
        attachment: Attachment,
        caption: Option<String>,
    },
}

impl ReplyContent {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Text or caption, for logs and tests.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Media { caption, .. } => caption.as_deref(),
        }
    }
}

// ── Transport ───────────────────────────────────────────────────────

/// Messaging transport: pure I/O, no moderation logic.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name, for logs.
    fn name(&self) -> &str;

    /// Delete a message; `everyone` deletes it for all participants.
    async fn delete_message(&self, msg: &MessageRef, everyone: bool)
    -> Result<(), TransportError>;

    async fn reply(&self, msg: &MessageRef, content: ReplyContent) -> Result<(), TransportError>;

    async fn download_attachment(&self, msg: &MessageRef) -> Result<Attachment, TransportError>;

    async fn quoted_message(
        &self,
        msg: &MessageRef,
    ) -> Result<Option<QuotedMessage>, TransportError>;

    /// Show the "composing" presence in a chat.
    async fn send_typing(&self, channel: &ChannelRef) -> Result<(), TransportError>;
}

// ── Decisions ───────────────────────────────────────────────────────

/// Pipeline states, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    MuteCheck,
    BlacklistCheck,
    CommandGate,
    CommandDispatch,
    MediaViewOnceCheck,
    MediaHashCheck,
    MediaClassifyCheck,
    Done,
    Suppressed,
}

/// Why a message (or its command effect) was suppressed.
#[derive(Debug, Clone, PartialEq)]
pub enum SuppressReason {
    Muted,
    Blacklisted { phrase: String },
    RateLimited(DenyReason),
    ViewOnce,
    BannedImage,
    UnsafeImage { category: String, probability: f32 },
}

impl SuppressReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Muted => "muted",
            Self::Blacklisted { .. } => "blacklisted",
            Self::RateLimited(_) => "rate_limited",
            Self::ViewOnce => "view_once",
            Self::BannedImage => "banned_image",
            Self::UnsafeImage { .. } => "unsafe_image",
        }
    }
}

/// Result of a single check: keep going or stop here.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Continue,
    Suppress(SuppressReason),
}

/// Final decision for one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Own message, not evaluated.
    Skipped,
    Allowed,
    CommandHandled { command: String },
    Suppressed(SuppressReason),
}

/// What the pipeline did with a message, including every stage it visited.
#[derive(Debug, Clone)]
pub struct ModerationOutcome {
    pub message_id: MessageRef,
    pub trail: Vec<Stage>,
    pub verdict: Verdict,
}

impl ModerationOutcome {
    pub fn is_suppressed(&self) -> bool {
        matches!(self.verdict, Verdict::Suppressed(_))
    }

    pub fn final_stage(&self) -> Stage {
        self.trail.last().copied().unwrap_or(Stage::Received)
    }

    pub fn visited(&self, stage: Stage) -> bool {
        self.trail.contains(&stage)
    }
}
