//! Quota-exhaustion circuit breaker.

use crate::core::TaskResult;
use std::sync::atomic::{AtomicBool, Ordering};

/// A write-once Closed→Open flag shared by every task of one batch.
///
/// Tripping does not cancel running tasks. It only stops new ones from
/// starting.
#[derive(Debug, Default)]
pub struct QuotaBreaker {
    open: AtomicBool,
}

impl QuotaBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the breaker has tripped.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Opens the breaker. Returns true if this call performed the transition.
    pub fn trip(&self) -> bool {
        self.open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Opens the breaker when `result` is a quota exhaustion.
    pub fn trip_if_quota_error<T>(&self, result: &TaskResult<T>) {
        if result.is_quota_exhausted() && self.trip() {
            tracing::warn!(key = %result.key, "Quota exhausted, breaker open");
        }
    }
}
