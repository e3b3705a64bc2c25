//! Pipeline execution.
//!
//! This module provides:
//! - Error classification for remote call failures
//! - Retry with exponential backoff
//! - A quota breaker shared by one image batch
//! - The bounded batch dispatcher
//! - The run controller with selective regeneration

mod breaker;
mod classify;
mod controller;
mod dispatcher;
pub mod retry;

pub use breaker::QuotaBreaker;
pub use classify::{classify, classify_status};
pub use controller::{PipelineController, QuotaStatus, RegenerationOutcome};
pub use dispatcher::{BatchPolicy, Dispatcher};
pub use retry::{RetryConfig, RetryDecision};
