//! Transports that feed the moderation pipeline.

pub mod console;

pub use console::{ConsoleChannel, ConsoleLine, MessageStream};
