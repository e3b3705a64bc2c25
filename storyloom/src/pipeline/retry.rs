//! Retry policy with exponential backoff and jitter.
//!
//! The policy wraps one unit of work and runs it on the calling task. It
//! retries transient and malformed failures, retries quota exhaustion only
//! when configured to, and never retries fatal failures.

use crate::core::TaskResult;
use crate::errors::{ErrorKind, ServiceError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

const JITTER_FRACTION: f64 = 0.1;

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Multiplier applied per attempt.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Maximum delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Adds up to 10% uniform jitter to each delay.
    #[serde(default = "default_true")]
    pub jitter: bool,
    /// Whether quota exhaustion is retried.
    #[serde(default = "default_true")]
    pub retry_on_quota: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            jitter: true,
            retry_on_quota: true,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the backoff factor.
    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets whether quota exhaustion is retried.
    #[must_use]
    pub fn with_retry_on_quota(mut self, retry: bool) -> Self {
        self.retry_on_quota = retry;
        self
    }

    /// Returns true if a failure of `kind` may be retried at all.
    #[must_use]
    pub fn retries_kind(&self, kind: ErrorKind) -> bool {
        kind.is_retryable() && (kind != ErrorKind::QuotaExhausted || self.retry_on_quota)
    }

    /// Calculates the delay before retry number `attempt + 1`.
    ///
    /// `base * factor^attempt`, plus up to 10% jitter, capped at
    /// `max_delay_ms`.
    #[must_use]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let mut delay = self.base_delay_ms as f64 * self.backoff_factor.powi(exponent);
        if self.jitter && delay > 0.0 {
            delay += delay * rand::thread_rng().gen_range(0.0..=JITTER_FRACTION);
        }
        let capped = delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Decides what to do after attempt number `attempt` (0-based) failed
    /// with `kind`.
    #[must_use]
    pub fn decide(&self, kind: ErrorKind, attempt: u32) -> RetryDecision {
        if !self.retries_kind(kind) {
            return RetryDecision::NotRetryable;
        }
        if attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(self.calculate_delay(attempt))
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries, give up.
    GiveUp,
    /// Don't retry, the error is not retryable.
    NotRetryable,
}

/// Executes an operation with retry logic.
///
/// The operation is invoked at most `max_retries + 1` times, and exactly
/// once if the first attempt succeeds. The last failure is returned.
pub async fn execute<T, F, Fut>(
    config: &RetryConfig,
    key: &str,
    mut operation: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt: u32 = 0;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        match config.decide(error.kind, attempt) {
            RetryDecision::Retry(delay) => {
                tracing::debug!(
                    key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            RetryDecision::GiveUp => {
                tracing::warn!(key, attempts = attempt + 1, error = %error, "Retries exhausted");
                return Err(error);
            }
            RetryDecision::NotRetryable => {
                tracing::debug!(key, kind = %error.kind, error = %error, "Not retrying");
                return Err(error);
            }
        }
    }
}

/// Runs [`execute`] and records the outcome as a [`TaskResult`].
pub async fn execute_task<T, F, Fut>(config: &RetryConfig, key: &str, operation: F) -> TaskResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    TaskResult::from_result(key, execute(config, key, operation).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn fast(retries: u32) -> RetryConfig {
        RetryConfig::new()
            .with_max_retries(retries)
            .with_base_delay_ms(1)
            .with_jitter(false)
    }

    async fn run_failing(config: &RetryConfig, error: ServiceError) -> (Result<(), ServiceError>, u32) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = execute(config, "test", || {
            let c = Arc::clone(&counter);
            let e = error.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(e)
            }
        })
        .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert!((config.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert!(config.jitter);
        assert!(config.retry_on_quota);
    }

    #[test]
    fn test_retry_config_partial_json() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_retries": 2, "retry_on_quota": false}"#).unwrap();
        assert_eq!(config.max_retries, 2);
        assert!(!config.retry_on_quota);
        assert_eq!(config.base_delay_ms, 1000);
    }

    #[test]
    fn test_calculate_delay_exponential_no_jitter() {
        let config = RetryConfig::new().with_base_delay_ms(100).with_jitter(false);
        assert_eq!(config.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_calculate_delay_jitter_bounds() {
        let config = RetryConfig::new().with_base_delay_ms(1000);
        for _ in 0..50 {
            let delay = config.calculate_delay(1).as_millis();
            assert!((2000..=2200).contains(&delay), "{delay}");
        }
    }

    #[test]
    fn test_calculate_delay_capped_at_max() {
        let config = RetryConfig::new()
            .with_base_delay_ms(1000)
            .with_max_delay_ms(5000)
            .with_jitter(false);
        assert_eq!(config.calculate_delay(10), Duration::from_millis(5000));
    }

    #[test]
    fn test_decide() {
        let config = RetryConfig::new().with_max_retries(1).with_jitter(false);
        assert!(matches!(config.decide(ErrorKind::Transient, 0), RetryDecision::Retry(_)));
        assert_eq!(config.decide(ErrorKind::Transient, 1), RetryDecision::GiveUp);
        assert_eq!(config.decide(ErrorKind::Fatal, 0), RetryDecision::NotRetryable);

        let no_quota = config.with_retry_on_quota(false);
        assert_eq!(no_quota.decide(ErrorKind::QuotaExhausted, 0), RetryDecision::NotRetryable);
    }

    #[tokio::test]
    async fn test_success_first_try_invokes_once() {
        let mut calls = 0;
        let result = execute(&RetryConfig::new(), "test", || {
            calls += 1;
            async { Ok::<_, ServiceError>(42) }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_success_after_failures() {
        let mut calls = 0;
        let result = execute(&fast(5), "test", || {
            calls += 1;
            let n = calls;
            async move {
                if n < 3 {
                    Err(ServiceError::transient(format!("attempt {n}")))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_invocations_bounded_by_max_retries() {
        for retries in 0..4 {
            let (result, calls) = run_failing(&fast(retries), ServiceError::transient("timeout")).await;
            assert!(result.is_err());
            assert_eq!(calls, retries + 1);
        }
    }

    #[tokio::test]
    async fn test_malformed_is_retried() {
        let (_, calls) = run_failing(&fast(2), ServiceError::malformed("bad json")).await;
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_fatal_never_retried() {
        let (result, calls) = run_failing(&fast(10), ServiceError::fatal("invalid api key")).await;
        assert_eq!(calls, 1);
        assert_eq!(result.unwrap_err().kind, ErrorKind::Fatal);
    }

    #[tokio::test]
    async fn test_quota_without_retry_returns_immediately() {
        let config = RetryConfig::new()
            .with_max_retries(3)
            .with_base_delay_ms(10_000)
            .with_retry_on_quota(false);

        let started = Instant::now();
        let (result, calls) = run_failing(&config, ServiceError::quota_exhausted("quota")).await;

        assert_eq!(calls, 1);
        assert_eq!(result.unwrap_err().kind, ErrorKind::QuotaExhausted);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_quota_retried_when_enabled() {
        let (_, calls) = run_failing(&fast(2), ServiceError::quota_exhausted("quota")).await;
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_execute_task_records_last_failure() {
        let mut calls = 0;
        let result: TaskResult<()> = execute_task(&fast(1), "page_1", || {
            calls += 1;
            let n = calls;
            async move { Err(ServiceError::transient(format!("failure {n}"))) }
        })
        .await;

        assert!(!result.success);
        assert_eq!(result.key, "page_1");
        assert_eq!(result.error_message.as_deref(), Some("failure 2"));
    }
}
