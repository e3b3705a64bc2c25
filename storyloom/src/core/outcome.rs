//! Batch outcomes: one result per submitted task, keyed by task key.

use super::TaskResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The collected results of one dispatcher batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome<T> {
    /// Results keyed by task key. Order carries no meaning.
    pub results: HashMap<String, TaskResult<T>>,
    /// Number of tasks submitted.
    pub attempted: usize,
    /// Number of successful results.
    pub succeeded: usize,
    /// Whether the batch's quota breaker was open when the batch finished.
    pub breaker_tripped: bool,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            results: HashMap::new(),
            attempted: 0,
            succeeded: 0,
            breaker_tripped: false,
        }
    }
}

impl<T> BatchOutcome<T> {
    /// Creates an empty outcome.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a result. Returns false (and drops the result) if its key is
    /// already present.
    pub fn record(&mut self, result: TaskResult<T>) -> bool {
        if self.results.contains_key(&result.key) {
            return false;
        }
        self.attempted += 1;
        if result.success {
            self.succeeded += 1;
        }
        self.results.insert(result.key.clone(), result);
        true
    }

    /// Looks up a result by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TaskResult<T>> {
        self.results.get(key)
    }

    /// Removes and returns a result by key.
    pub fn take(&mut self, key: &str) -> Option<TaskResult<T>> {
        self.results.remove(key)
    }

    /// Number of failed results.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }

    /// Returns true if any result is a quota exhaustion.
    #[must_use]
    pub fn any_quota_exhausted(&self) -> bool {
        self.results.values().any(TaskResult::is_quota_exhausted)
    }

    /// Returns the fraction of successful results.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.attempted as f64
    }

    /// Keys of failed results, sorted.
    #[must_use]
    pub fn failed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .results
            .values()
            .filter(|r| !r.success)
            .map(|r| r.key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;

    #[test]
    fn test_record_counts() {
        let mut outcome: BatchOutcome<u8> = BatchOutcome::new();
        assert!(outcome.record(TaskResult::succeeded("page_1", 1)));
        assert!(outcome.record(TaskResult::failed("page_2", ServiceError::transient("timeout"))));
        assert!(outcome.record(TaskResult::failed("cover", ServiceError::quota_exhausted("quota"))));

        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed(), 2);
        assert!(outcome.any_quota_exhausted());
        assert_eq!(outcome.failed_keys(), vec!["cover".to_string(), "page_2".to_string()]);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut outcome: BatchOutcome<u8> = BatchOutcome::new();
        assert!(outcome.record(TaskResult::succeeded("page_1", 1)));
        assert!(!outcome.record(TaskResult::succeeded("page_1", 2)));
        assert_eq!(outcome.attempted, 1);
        assert_eq!(outcome.get("page_1").and_then(TaskResult::value), Some(&1));
    }

    #[test]
    fn test_success_rate_empty() {
        let outcome: BatchOutcome<u8> = BatchOutcome::new();
        assert!(outcome.success_rate().abs() < f64::EPSILON);
    }
}
