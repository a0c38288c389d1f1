//! Console channel: stdin/stdout group simulator for local testing.
//!
//! Each input line is one message:
//!
//! ```text
//! alice: hello everyone
//! bob: img:./cat.png look at this
//! carol: once img:./secret.jpg
//! mod: re:c2 !banimage
//! ```
//!
//! Leading options: `re:<id>` replies to an earlier message, `img:<path>` and
//! `sticker:<path>` attach a file, `once` marks the media view-once.
//! Every message is echoed with its id so later lines can quote it.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::{Stream, stream};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::pipeline::types::{
    Attachment, ChannelRef, InboundMessage, MediaInfo, MediaKind, MessageRef, QuotedMessage,
    ReplyContent, Transport,
};

pub type MessageStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

const CONSOLE_CHANNEL: &str = "console";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub sender: String,
    pub body: String,
    pub quoted: Option<String>,
    pub media: Option<(MediaKind, PathBuf)>,
    pub view_once: bool,
}

impl ConsoleLine {
    /// Parse `sender: [options] body`. Returns `None` without a sender.
    pub fn parse(line: &str) -> Option<Self> {
        let (sender, rest) = line.split_once(':')?;
        let sender = sender.trim();
        if sender.is_empty() || sender.contains(char::is_whitespace) {
            return None;
        }

        let mut parsed = Self {
            sender: sender.to_string(),
            body: String::new(),
            quoted: None,
            media: None,
            view_once: false,
        };

        let mut rest = rest.trim_start();
        loop {
            let (token, tail) = rest.split_once(' ').unwrap_or((rest, ""));
            if let Some(id) = token.strip_prefix("re:") {
                parsed.quoted = Some(id.to_string());
            } else if let Some(path) = token.strip_prefix("img:") {
                parsed.media = Some((MediaKind::Image, PathBuf::from(path)));
            } else if let Some(path) = token.strip_prefix("sticker:") {
                parsed.media = Some((MediaKind::Sticker, PathBuf::from(path)));
            } else if token == "once" {
                parsed.view_once = true;
            } else {
                break;
            }
            rest = tail.trim_start();
        }
        parsed.body = rest.trim_end().to_string();

        // Without an attachment, "once" was the first word of the text.
        if parsed.view_once && parsed.media.is_none() {
            parsed.view_once = false;
            parsed.body = format!("once {}", parsed.body).trim_end().to_string();
        }
        Some(parsed)
    }
}

/// What the console remembers about a message so it can be quoted or
/// downloaded later.
#[derive(Debug, Clone)]
struct Record {
    sender: String,
    media: Option<MediaInfo>,
    path: Option<PathBuf>,
}

/// Reads messages from stdin and prints every moderation action.
#[derive(Clone, Default)]
pub struct ConsoleChannel {
    records: Arc<Mutex<HashMap<String, Record>>>,
    quotes: Arc<Mutex<HashMap<String, String>>>,
    next_id: Arc<AtomicU64>,
}

impl ConsoleChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parsed line and build the inbound message for it.
    pub async fn ingest(&self, line: ConsoleLine) -> InboundMessage {
        let id = format!("c{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);

        let media = line.media.as_ref().map(|(kind, path)| MediaInfo {
            kind: *kind,
            mime_type: Some(mime_for(path).to_string()),
            view_once: line.view_once,
        });

        self.records.lock().await.insert(
            id.clone(),
            Record {
                sender: line.sender.clone(),
                media: media.clone(),
                path: line.media.map(|(_, p)| p),
            },
        );
        if let Some(quoted) = line.quoted {
            self.quotes.lock().await.insert(id.clone(), quoted);
        }

        let mut msg = InboundMessage::text(&id, CONSOLE_CHANNEL, &line.sender, &line.body);
        msg.media = media;
        msg
    }

    /// Start reading stdin. The stream ends at EOF.
    pub fn start(&self) -> MessageStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let channel = self.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let Some(parsed) = ConsoleLine::parse(line) else {
                            eprintln!("   expected `sender: text`");
                            continue;
                        };
                        let msg = channel.ingest(parsed).await;
                        eprintln!("   [{}] {}: {}", msg.id, msg.sender, msg.body);
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        }))
    }

    async fn record(&self, msg: &MessageRef) -> Result<Record, TransportError> {
        self.records
            .lock()
            .await
            .get(&msg.0)
            .cloned()
            .ok_or_else(|| TransportError::Lookup(format!("unknown message {msg}")))
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl Transport for ConsoleChannel {
    fn name(&self) -> &str {
        CONSOLE_CHANNEL
    }

    async fn delete_message(&self, msg: &MessageRef, everyone: bool) -> Result<(), TransportError> {
        self.record(msg).await?;
        let scope = if everyone { "for everyone" } else { "for me" };
        println!("🗑️  [{msg}] deleted {scope}");
        Ok(())
    }

    async fn reply(&self, msg: &MessageRef, content: ReplyContent) -> Result<(), TransportError> {
        let mut out = std::io::stdout().lock();
        let written = match content {
            ReplyContent::Text(text) => writeln!(out, "↪ [{msg}] {text}"),
            ReplyContent::Media {
                attachment,
                caption,
            } => writeln!(
                out,
                "↪ [{msg}] <{} bytes of {}> {}",
                attachment.data.len(),
                attachment.mime_type,
                caption.unwrap_or_default()
            ),
        };
        written.map_err(|e| TransportError::SendFailed {
            message_id: msg.0.clone(),
            reason: e.to_string(),
        })
    }

    async fn download_attachment(&self, msg: &MessageRef) -> Result<Attachment, TransportError> {
        let record = self.record(msg).await?;
        let path = record.path.ok_or_else(|| TransportError::DownloadFailed {
            message_id: msg.0.clone(),
            reason: "message has no attachment".into(),
        })?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| TransportError::DownloadFailed {
                message_id: msg.0.clone(),
                reason: format!("{}: {e}", path.display()),
            })?;
        Ok(Attachment {
            mime_type: mime_for(&path).to_string(),
            data,
        })
    }

    async fn quoted_message(
        &self,
        msg: &MessageRef,
    ) -> Result<Option<QuotedMessage>, TransportError> {
        let Some(quoted_id) = self.quotes.lock().await.get(&msg.0).cloned() else {
            return Ok(None);
        };
        let quoted = MessageRef(quoted_id);
        let record = self.record(&quoted).await?;
        Ok(Some(QuotedMessage {
            id: quoted,
            sender: record.sender,
            media: record.media,
        }))
    }

    async fn send_typing(&self, channel: &ChannelRef) -> Result<(), TransportError> {
        eprintln!("   ✍️  typing in {}...", channel.0);
        Ok(())
    }
}
