//! Randomised response pacing so replies never arrive instantly or on a
//! fixed cadence.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::HumanizeConfig;
use crate::pipeline::types::{ChannelRef, Transport};

/// Stateless delay scheduler.
#[derive(Debug, Clone)]
pub struct Humanizer {
    config: HumanizeConfig,
}

impl Humanizer {
    pub fn new(config: HumanizeConfig) -> Self {
        Self { config }
    }

    /// Wait a duration drawn uniformly from the reply-delay range.
    pub async fn delay(&self) {
        let wait = self.sample_reply_delay();
        debug!(ms = wait.as_millis() as u64, "Humanized reply delay");
        tokio::time::sleep(wait).await;
    }

    /// Show "composing" in `channel`, then wait a typing-length duration.
    ///
    /// A failed presence signal is logged and the wait still happens.
    pub async fn typing_simulation(&self, transport: &dyn Transport, channel: &ChannelRef) {
        if let Err(e) = transport.send_typing(channel).await {
            warn!(channel = %channel.0, error = %e, "Failed to send typing state");
        }
        let wait = self.sample_typing();
        debug!(ms = wait.as_millis() as u64, "Simulated typing");
        tokio::time::sleep(wait).await;
    }

    pub fn sample_reply_delay(&self) -> Duration {
        sample(self.config.min_reply_delay, self.config.max_reply_delay)
    }

    pub fn sample_typing(&self) -> Duration {
        sample(self.config.min_typing, self.config.max_typing)
    }
}

impl Default for Humanizer {
    fn default() -> Self {
        Self::new(HumanizeConfig::default())
    }
}

fn sample(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let ms = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}
