//! Moderation processor: runs every inbound message through the checks.
//!
//! **Core invariant: checks run in a fixed order and the first suppression
//! is terminal.**
//!
//! Flow:
//! 1. Mute check → purge silently
//! 2. Blacklist check → purge + warning
//! 3. Commands: rate-limit gate → humanized delay → dispatch
//! 4. Media (non-command only): view-once → banned fingerprint → classifier
//!
//! Checks only read the registries. Mute and blacklist are authoritative;
//! every media check fails open.

use std::fmt::Display;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classifier::{ClassifierAdapter, NsfwClassifier, PixelTensor};
use crate::config::GuardianConfig;
use crate::phash;
use crate::pipeline::commands::{CommandContext, CommandHandler, ParsedCommand};
use crate::pipeline::moderator::ModeratorCommands;
use crate::pipeline::stats::PipelineStats;
use crate::pipeline::types::{
    Attachment, CheckOutcome, InboundMessage, MediaInfo, ModerationOutcome, ReplyContent, Stage,
    SuppressReason, Transport, Verdict,
};
use crate::registry::Registries;
use crate::throttle::{Humanizer, RateDecision, RateLimiter};

pub const BLACKLIST_WARNING: &str = "⚠️ Message deleted. Banned phrase detected.";
pub const BANNED_IMAGE_NOTICE: &str = "🚫 This image is banned and has been removed.";
pub const UNSAFE_IMAGE_NOTICE: &str = "⚠️ Image removed for inappropriate content.";

/// Stages visited so far for one message.
struct Trail(Vec<Stage>);

impl Trail {
    fn start() -> Self {
        Self(vec![Stage::Received])
    }

    fn enter(&mut self, stage: Stage) {
        debug!(?stage, "Entering stage");
        self.0.push(stage);
    }
}

/// Collapse a fallible check into a decision, allowing on error.
fn fail_open<E: Display>(stage: Stage, result: Result<CheckOutcome, E>) -> CheckOutcome {
    result.unwrap_or_else(|e| {
        warn!(?stage, error = %e, "Check failed, allowing message");
        CheckOutcome::Continue
    })
}

/// The moderation orchestrator.
///
/// Stateless across messages apart from the registries and rate counters it
/// holds references to.
pub struct ModerationProcessor {
    config: GuardianConfig,
    registries: Registries,
    limiter: RateLimiter,
    humanizer: Humanizer,
    classifier: ClassifierAdapter,
    transport: Arc<dyn Transport>,
    commands: Arc<dyn CommandHandler>,
    moderator: ModeratorCommands,
    stats: PipelineStats,
}

impl ModerationProcessor {
    pub fn new(
        config: GuardianConfig,
        registries: Registries,
        transport: Arc<dyn Transport>,
        classifier: Arc<dyn NsfwClassifier>,
        commands: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(config.rate_limit.clone()),
            humanizer: Humanizer::new(config.humanize.clone()),
            classifier: ClassifierAdapter::new(classifier),
            moderator: ModeratorCommands::new(config.clone(), registries.clone()),
            stats: PipelineStats::new(),
            config,
            registries,
            transport,
            commands,
        }
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Evaluate one inbound message exactly once.
    pub async fn process(&self, message: &InboundMessage) -> ModerationOutcome {
        debug!(
            id = %message.id,
            sender = %message.sender,
            has_media = message.media.is_some(),
            "Processing inbound message"
        );
        self.stats.record_message();
        let mut trail = Trail::start();

        if message.from_me {
            return self.finish(message, trail, Verdict::Skipped);
        }

        trail.enter(Stage::MuteCheck);
        if let CheckOutcome::Suppress(reason) = self.check_mute(message).await {
            return self.suppress(message, trail, reason).await;
        }

        trail.enter(Stage::BlacklistCheck);
        if let CheckOutcome::Suppress(reason) = self.check_blacklist(message).await {
            return self.suppress(message, trail, reason).await;
        }

        if let Some(command) = ParsedCommand::parse(&message.body, &self.config.command_prefix) {
            return self.run_command(message, trail, command).await;
        }

        if let Some(media) = &message.media {
            if let CheckOutcome::Suppress(reason) =
                self.check_media(message, media, &mut trail).await
            {
                return self.suppress(message, trail, reason).await;
            }
        }

        trail.enter(Stage::Done);
        self.finish(message, trail, Verdict::Allowed)
    }

    // ── Checks ──────────────────────────────────────────────────────

    async fn check_mute(&self, message: &InboundMessage) -> CheckOutcome {
        if self.registries.mute.is_muted(&message.sender).await {
            CheckOutcome::Suppress(SuppressReason::Muted)
        } else {
            CheckOutcome::Continue
        }
    }

    async fn check_blacklist(&self, message: &InboundMessage) -> CheckOutcome {
        match self.registries.blacklist.check(&message.body).await {
            Some(phrase) => CheckOutcome::Suppress(SuppressReason::Blacklisted { phrase }),
            None => CheckOutcome::Continue,
        }
    }

    /// View-once, then fingerprint, then classifier (still images only).
    async fn check_media(
        &self,
        message: &InboundMessage,
        media: &MediaInfo,
        trail: &mut Trail,
    ) -> CheckOutcome {
        trail.enter(Stage::MediaViewOnceCheck);
        if media.view_once {
            return CheckOutcome::Suppress(SuppressReason::ViewOnce);
        }
        if !media.kind.is_image_like() {
            return CheckOutcome::Continue;
        }

        trail.enter(Stage::MediaHashCheck);
        let attachment = match self.transport.download_attachment(&message.id).await {
            Ok(a) => a,
            Err(e) => {
                warn!(id = %message.id, error = %e, "Attachment download failed, allowing message");
                return CheckOutcome::Continue;
            }
        };

        // Decoded once, shared by the fingerprint and the classifier.
        let image = match phash::decode_blocking(attachment.data).await {
            Ok(img) => img,
            Err(e) => {
                warn!(id = %message.id, error = %e, "Attachment is not a decodable image, allowing message");
                return CheckOutcome::Continue;
            }
        };
        if phash::is_banned_image(&image, &self.registries.banned_images).await {
            return CheckOutcome::Suppress(SuppressReason::BannedImage);
        }

        if !media.kind.is_still_image() {
            return CheckOutcome::Continue;
        }

        trail.enter(Stage::MediaClassifyCheck);
        let pixels = PixelTensor::from_rgb(image);
        let screened = self
            .classifier
            .screen_pixels(&pixels)
            .await
            .map(|verdict| match verdict {
                Some(v) => CheckOutcome::Suppress(SuppressReason::UnsafeImage {
                    category: v.category,
                    probability: v.probability,
                }),
                None => CheckOutcome::Continue,
            });
        fail_open(Stage::MediaClassifyCheck, screened)
    }

    // ── Commands ────────────────────────────────────────────────────

    async fn run_command(
        &self,
        message: &InboundMessage,
        mut trail: Trail,
        command: ParsedCommand,
    ) -> ModerationOutcome {
        trail.enter(Stage::CommandGate);
        self.stats.record_command();

        let is_download = self.config.is_download_command(&command.name);
        if let RateDecision::Denied(reason) = self.limiter.check(&message.sender, is_download).await
        {
            return self
                .suppress(message, trail, SuppressReason::RateLimited(reason))
                .await;
        }

        if is_download {
            self.stats.record_download();
        }
        self.humanizer.delay().await;
        if is_download {
            self.humanizer
                .typing_simulation(self.transport.as_ref(), &message.channel)
                .await;
        }

        trail.enter(Stage::CommandDispatch);
        self.dispatch(message, &command).await;

        trail.enter(Stage::Done);
        self.finish(
            message,
            trail,
            Verdict::CommandHandled {
                command: command.name,
            },
        )
    }

    async fn dispatch(&self, message: &InboundMessage, command: &ParsedCommand) {
        let reply = match self
            .moderator
            .execute(message, command, self.transport.as_ref())
            .await
        {
            Some(text) => Some(ReplyContent::Text(text)),
            None => {
                let ctx = CommandContext {
                    message,
                    command,
                    quoted_attachment: self.resolve_quoted_attachment(message).await,
                };
                match self.commands.handle(ctx).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(id = %message.id, command = %command.name, error = %e, "Command failed");
                        Some(ReplyContent::Text(format!("❌ {e}")))
                    }
                }
            }
        };

        if let Some(reply) = reply {
            self.send_reply(message, reply).await;
        }
    }

    /// Attachment of the quoted message, or `None` on any failure.
    async fn resolve_quoted_attachment(&self, message: &InboundMessage) -> Option<Attachment> {
        let quoted = match self.transport.quoted_message(&message.id).await {
            Ok(Some(q)) if q.media.is_some() => q,
            Ok(_) => return None,
            Err(e) => {
                warn!(id = %message.id, error = %e, "Failed to fetch quoted message");
                return None;
            }
        };
        match self.transport.download_attachment(&quoted.id).await {
            Ok(a) => Some(a),
            Err(e) => {
                warn!(id = %quoted.id, error = %e, "Failed to download quoted attachment");
                None
            }
        }
    }

    // ── Enforcement ─────────────────────────────────────────────────

    /// Apply the side effects of a suppression and close the trail.
    ///
    /// Transport failures are logged; the decision stands either way.
    async fn suppress(
        &self,
        message: &InboundMessage,
        mut trail: Trail,
        reason: SuppressReason,
    ) -> ModerationOutcome {
        info!(
            id = %message.id,
            sender = %message.sender,
            reason = reason.label(),
            "Suppressing message"
        );

        match &reason {
            SuppressReason::Muted | SuppressReason::ViewOnce => {
                self.delete(message).await;
            }
            SuppressReason::Blacklisted { .. } => {
                self.delete(message).await;
                self.send_reply(message, ReplyContent::text(BLACKLIST_WARNING))
                    .await;
            }
            SuppressReason::BannedImage => {
                self.delete(message).await;
                self.send_reply(message, ReplyContent::text(BANNED_IMAGE_NOTICE))
                    .await;
            }
            SuppressReason::UnsafeImage { .. } => {
                self.delete(message).await;
                self.send_reply(message, ReplyContent::text(UNSAFE_IMAGE_NOTICE))
                    .await;
            }
            SuppressReason::RateLimited(deny) => {
                // Only the command effect is withheld; the message stays.
                self.humanizer.delay().await;
                self.send_reply(message, ReplyContent::text(format!("⏱️ {}", deny.message())))
                    .await;
            }
        }

        self.stats.record_suppressed();
        trail.enter(Stage::Suppressed);
        self.finish(message, trail, Verdict::Suppressed(reason))
    }

    async fn delete(&self, message: &InboundMessage) {
        if let Err(e) = self.transport.delete_message(&message.id, true).await {
            warn!(id = %message.id, error = %e, "Failed to delete message");
        }
    }

    async fn send_reply(&self, message: &InboundMessage, content: ReplyContent) {
        if let Err(e) = self.transport.reply(&message.id, content).await {
            warn!(id = %message.id, error = %e, "Failed to send reply");
        }
    }

    fn finish(&self, message: &InboundMessage, trail: Trail, verdict: Verdict) -> ModerationOutcome {
        ModerationOutcome {
            message_id: message.id.clone(),
            trail: trail.0,
            verdict,
        }
    }
}
