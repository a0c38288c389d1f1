//! Session counters for the moderation pipeline.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lock-free counters updated as messages flow through the pipeline.
#[derive(Debug)]
pub struct PipelineStats {
    started_at: DateTime<Utc>,
    messages: AtomicU64,
    commands: AtomicU64,
    downloads: AtomicU64,
    suppressed: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub messages: u64,
    pub commands: u64,
    pub downloads: u64,
    pub suppressed: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            messages: AtomicU64::new(0),
            commands: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    pub fn record_message(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_download(&self) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at,
            messages: self.messages.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}
