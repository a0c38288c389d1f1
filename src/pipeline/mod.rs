//! Message moderation pipeline.
//!
//! Every inbound message from the group channel flows through:
//! 1. `Transport`: channel-specific I/O, no moderation logic
//! 2. `ModerationProcessor::process()`: ordered checks, first hit wins
//! 3. `ModeratorCommands` / `CommandHandler`: effects of allowed commands
//!
//! **Registries are only mutated by moderator commands.** Checks read them.

pub mod commands;
pub mod moderator;
pub mod processor;
pub mod stats;
pub mod types;

pub use commands::{CommandContext, CommandHandler, NoopCommandHandler, ParsedCommand};
pub use processor::ModerationProcessor;
pub use stats::{PipelineStats, StatsSnapshot};
pub use types::{InboundMessage, ModerationOutcome, Stage, SuppressReason, Transport, Verdict};
