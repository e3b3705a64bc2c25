//! Bounded, breaker-aware batch dispatcher.
//!
//! A batch of independent tasks runs on spawned tokio tasks, at most
//! `pool_size` at a time. Permits are handed out in submission order, and
//! the breaker is checked once a permit is held, right before the task
//! would start. A worker keeps its permit until it has reported to the
//! breaker, so any task that starts after it sees the trip.

use super::breaker::QuotaBreaker;
use super::retry::{self, RetryConfig};
use crate::core::{BatchOutcome, TaskDescriptor, TaskResult};
use crate::errors::{ServiceError, StoryloomError};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Pool size and per-task timeout of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchPolicy {
    /// Maximum concurrently executing tasks.
    pub pool_size: usize,
    /// Per-task timeout covering all retry attempts.
    pub timeout_seconds: f64,
}

impl BatchPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(pool_size: usize, timeout_seconds: f64) -> Self {
        Self {
            pool_size,
            timeout_seconds,
        }
    }

    /// Prompt-text batches: 5 workers, 60s.
    #[must_use]
    pub fn prompts() -> Self {
        Self::new(5, 60.0)
    }

    /// Image batches: 5 workers, 180s.
    #[must_use]
    pub fn images() -> Self {
        Self::new(5, 180.0)
    }

    /// Image batches under quota pressure: 1 worker, 180s.
    #[must_use]
    pub fn conservative() -> Self {
        Self::new(1, 180.0)
    }

    /// Audio batches: 3 workers, 120s.
    #[must_use]
    pub fn audio() -> Self {
        Self::new(3, 120.0)
    }

    /// The timeout as a duration, saturating at [`Duration::MAX`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds).unwrap_or(Duration::MAX)
    }

    /// Checks the policy.
    pub fn validate(&self, name: &str) -> Result<(), StoryloomError> {
        if self.pool_size == 0 {
            return Err(StoryloomError::Config(format!("{name}: pool_size must be at least 1")));
        }
        if self.pool_size > Semaphore::MAX_PERMITS {
            return Err(StoryloomError::Config(format!(
                "{name}: pool_size must be at most {}, got {}",
                Semaphore::MAX_PERMITS,
                self.pool_size
            )));
        }
        if !(self.timeout_seconds > 0.0 && Duration::try_from_secs_f64(self.timeout_seconds).is_ok())
        {
            return Err(StoryloomError::Config(format!(
                "{name}: timeout_seconds must be positive, got {}",
                self.timeout_seconds
            )));
        }
        Ok(())
    }
}

/// Runs batches of tasks under one policy.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    name: String,
    policy: BatchPolicy,
    retry: RetryConfig,
    breaker: Option<Arc<QuotaBreaker>>,
}

impl Dispatcher {
    /// Creates a dispatcher without a breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, policy: BatchPolicy, retry: RetryConfig) -> Self {
        Self {
            name: name.into(),
            policy,
            retry,
            breaker: None,
        }
    }

    /// Shares `breaker` with every task of the batch.
    #[must_use]
    pub fn with_breaker(mut self, breaker: Arc<QuotaBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Runs every task and returns one result per task.
    ///
    /// Fails only on an invalid policy or duplicate task keys; task failures
    /// are recorded in the outcome.
    pub async fn run<P, T, F, Fut>(
        &self,
        tasks: Vec<TaskDescriptor<P>>,
        worker: F,
    ) -> Result<BatchOutcome<T>, StoryloomError>
    where
        P: Send + Sync + 'static,
        T: Send + 'static,
        F: Fn(Arc<TaskDescriptor<P>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ServiceError>> + Send + 'static,
    {
        self.policy.validate(&self.name)?;
        let mut seen = HashSet::with_capacity(tasks.len());
        if let Some(dup) = tasks.iter().find(|t| !seen.insert(t.key())) {
            return Err(StoryloomError::DuplicateTaskKey(dup.key().to_string()));
        }

        let started = Instant::now();
        let total = tasks.len();
        tracing::info!(
            batch = %self.name,
            tasks = total,
            pool_size = self.policy.pool_size,
            "Starting batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.policy.pool_size));
        let worker = Arc::new(worker);
        let timeout = self.policy.timeout();
        let mut outcome = BatchOutcome::new();
        let mut running = FuturesUnordered::new();

        for task in tasks {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| StoryloomError::Config(format!("{}: {e}", self.name)))?;

            if self.breaker.as_ref().is_some_and(|b| b.is_open()) {
                tracing::debug!(batch = %self.name, key = task.key(), "Skipping task, breaker open");
                outcome.record(TaskResult::failed(task.key(), ServiceError::skipped_quota()));
                continue;
            }

            let key = task.key().to_string();
            let task = Arc::new(task);
            let worker = Arc::clone(&worker);
            let retry = self.retry.clone();
            let breaker = self.breaker.clone();
            let task_key = key.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let attempts = retry::execute(&retry, &task_key, || worker(Arc::clone(&task)));
                let result = match tokio::time::timeout(timeout, attempts).await {
                    Ok(result) => TaskResult::from_result(task_key.as_str(), result),
                    Err(_) => {
                        tracing::warn!(key = %task_key, "Task timed out");
                        TaskResult::failed(task_key.as_str(), ServiceError::timeout())
                    }
                };
                if let Some(breaker) = &breaker {
                    breaker.trip_if_quota_error(&result);
                }
                result
            });
            running.push(async move { (key, handle.await) });
        }

        while let Some((key, joined)) = running.next().await {
            let result = joined.unwrap_or_else(|e| {
                tracing::error!(key = %key, error = %e, "Worker panicked");
                TaskResult::failed(key, ServiceError::fatal(format!("worker panicked: {e}")))
            });
            outcome.record(result);
        }

        outcome.breaker_tripped = self.breaker.as_ref().is_some_and(|b| b.is_open());
        tracing::info!(
            batch = %self.name,
            attempted = outcome.attempted,
            succeeded = outcome.succeeded,
            success_rate = outcome.success_rate(),
            breaker_tripped = outcome.breaker_tripped,
            duration_ms = started.elapsed().as_millis() as u64,
            "Batch finished"
        );
        if outcome.succeeded < outcome.attempted {
            tracing::debug!(batch = %self.name, failed = ?outcome.failed_keys(), "Batch failures");
        }
        Ok(outcome)
    }
}
