use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;

use chat_guardian::channels::ConsoleChannel;
use chat_guardian::classifier::UnavailableClassifier;
use chat_guardian::config::GuardianConfig;
use chat_guardian::pipeline::{ModerationProcessor, NoopCommandHandler, Verdict};
use chat_guardian::registry::Registries;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = GuardianConfig::from_env().context("invalid configuration")?;

    eprintln!("🛡️  Chat Guardian v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Data dir: {}", config.data_dir.display());
    eprintln!("   Command prefix: {}", config.command_prefix);
    eprintln!(
        "   Moderators: {}",
        if config.moderators.is_empty() {
            "everyone".to_string()
        } else {
            config.moderators.join(", ")
        }
    );

    // ── Registries ──────────────────────────────────────────────────────
    let registries = Registries::open(&config).await;
    eprintln!(
        "   Loaded: {} muted, {} blacklisted phrases, {} banned images",
        registries.mute.list().await.len(),
        registries.blacklist.list().await.len(),
        registries.banned_images.len().await,
    );
    eprintln!("   Type `sender: text` and press Enter. Ctrl-D to exit.\n");

    // ── Pipeline ────────────────────────────────────────────────────────
    let console = Arc::new(ConsoleChannel::new());
    let processor = ModerationProcessor::new(
        config,
        registries,
        console.clone(),
        Arc::new(UnavailableClassifier),
        Arc::new(NoopCommandHandler),
    );

    let mut messages = console.start();
    while let Some(message) = messages.next().await {
        let outcome = processor.process(&message).await;
        match &outcome.verdict {
            Verdict::Allowed | Verdict::Skipped => {}
            verdict => eprintln!("   → {verdict:?}"),
        }
        tracing::debug!(id = %outcome.message_id, trail = ?outcome.trail, "Message processed");
    }

    let stats = processor.stats().snapshot();
    eprintln!(
        "\n📊 Session: {}",
        serde_json::to_string(&stats).context("failed to serialize stats")?
    );
    Ok(())
}
