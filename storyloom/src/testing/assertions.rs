//! Test assertions for task results and batch outcomes.

use crate::core::{BatchOutcome, TaskResult};
use crate::errors::ErrorKind;

/// Asserts that the result indicates success.
pub fn assert_task_succeeded<T>(result: &TaskResult<T>) {
    assert!(
        result.success,
        "Expected '{}' to succeed, got {:?}: {:?}",
        result.key, result.error_kind, result.error_message
    );
}

/// Asserts that the result failed with `kind`.
pub fn assert_task_failed_with<T>(result: &TaskResult<T>, kind: ErrorKind) {
    assert!(!result.success, "Expected '{}' to fail", result.key);
    assert_eq!(
        result.error_kind,
        Some(kind),
        "Expected '{}' to fail with {:?}, got {:?}",
        result.key,
        kind,
        result.error_kind
    );
}

/// Asserts that the outcome holds exactly one result for each of `keys`.
pub fn assert_outcome_keys<T>(outcome: &BatchOutcome<T>, keys: &[String]) {
    let mut actual: Vec<&String> = outcome.results.keys().collect();
    actual.sort();
    let mut expected: Vec<&String> = keys.iter().collect();
    expected.sort();
    assert_eq!(actual, expected, "Outcome keys differ from submitted keys");
    assert_eq!(
        outcome.attempted,
        keys.len(),
        "Expected {} attempted, got {}",
        keys.len(),
        outcome.attempted
    );
}
