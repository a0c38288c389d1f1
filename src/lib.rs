//! Chat Guardian: moderation core for a group chat.

pub mod channels;
pub mod classifier;
pub mod config;
pub mod error;
pub mod phash;
pub mod pipeline;
pub mod registry;
pub mod throttle;
