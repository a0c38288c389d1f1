//! Per-identity command quotas with lazily reset windows.
//!
//! Two independent windows per identity: a short one bounding command
//! bursts and a long one bounding download-class commands. Windows are
//! reset only when a check observes that they have elapsed; there is no
//! background timer.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::RateLimitConfig;

pub const TOO_MANY_COMMANDS: &str = "too many commands, wait a minute";
pub const DOWNLOAD_LIMIT_REACHED: &str = "download limit reached, wait an hour";

/// Counters for one identity.
///
/// Created on the identity's first check and never removed; the map is
/// bounded by the channel's membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitState {
    pub window_start: DateTime<Utc>,
    pub command_count: u32,
    pub download_window_start: DateTime<Utc>,
    pub download_count: u32,
    pub last_command_at: Option<DateTime<Utc>>,
    pub last_download_at: Option<DateTime<Utc>>,
}

impl RateLimitState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            command_count: 0,
            download_window_start: now,
            download_count: 0,
            last_command_at: None,
            last_download_at: None,
        }
    }
}

/// Why a command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    TooManyCommands,
    DownloadLimit,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            Self::TooManyCommands => TOO_MANY_COMMANDS,
            Self::DownloadLimit => DOWNLOAD_LIMIT_REACHED,
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied(DenyReason),
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Allowed => None,
            Self::Denied(r) => Some(r.message()),
        }
    }
}

/// Keyed store of [`RateLimitState`] guarded by a single lock, so every
/// check is an atomic read-modify-write.
pub struct RateLimiter {
    config: RateLimitConfig,
    states: Mutex<HashMap<String, RateLimitState>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Bill one command for `identity` at the current time.
    pub async fn check(&self, identity: &str, is_download: bool) -> RateDecision {
        self.check_at(identity, is_download, Utc::now()).await
    }

    /// Bill one command for `identity` as of `now`.
    ///
    /// Denials leave counters and timestamps untouched, so the identity stays
    /// pinned at the limit until its window rolls over.
    pub async fn check_at(
        &self,
        identity: &str,
        is_download: bool,
        now: DateTime<Utc>,
    ) -> RateDecision {
        let command_window = to_chrono(self.config.command_window);
        let download_window = to_chrono(self.config.download_window);

        let mut states = self.states.lock().await;
        let state = states
            .entry(identity.to_string())
            .or_insert_with(|| RateLimitState::fresh(now));

        if now - state.window_start > command_window {
            state.command_count = 0;
            state.window_start = now;
        }
        if now - state.download_window_start > download_window {
            state.download_count = 0;
            state.download_window_start = now;
        }

        if state.command_count >= self.config.max_commands_per_window {
            debug!(identity = %identity, count = state.command_count, "Command limit hit");
            return RateDecision::Denied(DenyReason::TooManyCommands);
        }
        if is_download && state.download_count >= self.config.max_downloads_per_window {
            debug!(identity = %identity, count = state.download_count, "Download limit hit");
            return RateDecision::Denied(DenyReason::DownloadLimit);
        }

        state.command_count += 1;
        state.last_command_at = Some(now);
        if is_download {
            state.download_count += 1;
            state.last_download_at = Some(now);
        }
        RateDecision::Allowed
    }

    /// Snapshot of an identity's counters, if it has ever been checked.
    pub async fn state(&self, identity: &str) -> Option<RateLimitState> {
        self.states.lock().await.get(identity).cloned()
    }

    /// Number of identities tracked so far.
    pub async fn tracked(&self) -> usize {
        self.states.lock().await.len()
    }
}

fn to_chrono(d: std::time::Duration) -> Duration {
    Duration::from_std(d).unwrap_or(Duration::MAX)
}
