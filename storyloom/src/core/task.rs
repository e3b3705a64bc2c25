//! Units of work and their results.

use super::TaskVariant;
use crate::errors::{ErrorKind, ServiceError};
use serde::{Deserialize, Serialize};

/// Key used for the cover in every batch.
pub const COVER_KEY: &str = "cover";

/// Returns the batch key for a page ordinal (1-based).
#[must_use]
pub fn page_key(ordinal: usize) -> String {
    format!("page_{ordinal}")
}

/// One unit of work submitted to a batch.
///
/// Identity is `key`, which must be unique within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor<P> {
    key: String,
    ordinal: usize,
    variant: TaskVariant,
    payload: P,
}

impl<P> TaskDescriptor<P> {
    /// Creates a descriptor with an explicit key.
    #[must_use]
    pub fn new(key: impl Into<String>, ordinal: usize, variant: TaskVariant, payload: P) -> Self {
        Self {
            key: key.into(),
            ordinal,
            variant,
            payload,
        }
    }

    /// Creates the cover descriptor.
    #[must_use]
    pub fn cover(payload: P) -> Self {
        Self::new(COVER_KEY, 0, TaskVariant::Cover, payload)
    }

    /// Creates a page descriptor keyed `page_{ordinal}`.
    #[must_use]
    pub fn page(ordinal: usize, payload: P) -> Self {
        Self::new(page_key(ordinal), ordinal, TaskVariant::Page, payload)
    }

    /// The task key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The ordinal (0 for the cover).
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Cover or page.
    #[must_use]
    pub fn variant(&self) -> TaskVariant {
        self.variant
    }

    /// The opaque input.
    #[must_use]
    pub fn payload(&self) -> &P {
        &self.payload
    }
}

/// The recorded outcome of one unit of work.
///
/// When `success` is true, `value` is populated; otherwise `error_kind` and
/// `error_message` are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult<T> {
    /// The task key.
    pub key: String,
    /// Whether the unit succeeded.
    pub success: bool,
    /// The produced value on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    /// The failure class on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// The failure detail on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl<T> TaskResult<T> {
    /// Creates a successful result.
    #[must_use]
    pub fn succeeded(key: impl Into<String>, value: T) -> Self {
        Self {
            key: key.into(),
            success: true,
            value: Some(value),
            error_kind: None,
            error_message: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(key: impl Into<String>, error: ServiceError) -> Self {
        Self {
            key: key.into(),
            success: false,
            value: None,
            error_kind: Some(error.kind),
            error_message: Some(error.message),
        }
    }

    /// Creates a result from a call outcome.
    #[must_use]
    pub fn from_result(key: impl Into<String>, result: Result<T, ServiceError>) -> Self {
        match result {
            Ok(value) => Self::succeeded(key, value),
            Err(error) => Self::failed(key, error),
        }
    }

    /// Returns true if this failure is a quota exhaustion.
    #[must_use]
    pub fn is_quota_exhausted(&self) -> bool {
        !self.success && self.error_kind == Some(ErrorKind::QuotaExhausted)
    }

    /// Reconstructs the failure, if any.
    #[must_use]
    pub fn error(&self) -> Option<ServiceError> {
        if self.success {
            return None;
        }
        Some(ServiceError::new(
            self.error_kind.unwrap_or(ErrorKind::Fatal),
            self.error_message.clone().unwrap_or_default(),
        ))
    }

    /// Borrows the value.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }
}
