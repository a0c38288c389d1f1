//! Throttling of command-triggered work: quotas and humanized pacing.

pub mod humanize;
pub mod rate_limit;

pub use humanize::Humanizer;
pub use rate_limit::{DenyReason, RateDecision, RateLimitState, RateLimiter};
