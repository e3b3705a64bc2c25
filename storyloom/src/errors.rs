//! Error types for the storyloom orchestration engine.
//!
//! Two layers exist: [`ServiceError`] is what a single remote call (or the
//! retry policy wrapping it) reports, tagged with an [`ErrorKind`];
//! [`StoryloomError`] is what the controller returns to its callers.

use crate::core::RunStage;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure classes shared by every collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network trouble, timeouts and 5xx responses.
    Transient,
    /// The remote quota is used up.
    QuotaExhausted,
    /// The response could not be parsed.
    MalformedResponse,
    /// Anything else; never retried.
    Fatal,
}

impl ErrorKind {
    /// Returns true for kinds the retry policy may retry at all.
    ///
    /// Quota exhaustion is additionally gated by `retry_on_quota`.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Fatal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::QuotaExhausted => write!(f, "quota_exhausted"),
            Self::MalformedResponse => write!(f, "malformed_response"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// A classified failure of one remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    /// The failure class.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl ServiceError {
    /// Creates an error with an explicit kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an error whose kind is derived from the message text.
    ///
    /// Use this for raw failures (exceptions, transport errors) that carry
    /// no structured signal. See [`crate::pipeline::classify`].
    #[must_use]
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = crate::pipeline::classify(&message);
        Self { kind, message }
    }

    /// Creates a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    /// Creates a quota exhausted error.
    #[must_use]
    pub fn quota_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QuotaExhausted, message)
    }

    /// Creates a malformed response error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, message)
    }

    /// Creates a fatal error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// The dispatcher's timeout failure.
    #[must_use]
    pub fn timeout() -> Self {
        Self::new(ErrorKind::Transient, "timeout")
    }

    /// The dispatcher's breaker-open failure.
    #[must_use]
    pub fn skipped_quota() -> Self {
        Self::new(ErrorKind::QuotaExhausted, "skipped: quota exhausted")
    }

}

/// The main error type for storyloom operations.
#[derive(Debug, Error)]
pub enum StoryloomError {
    /// A primary (non-batch) stage failed and the run was aborted.
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        /// The stage that failed.
        stage: RunStage,
        /// The last failure reported by the stage.
        #[source]
        source: ServiceError,
    },

    /// An operation needed an artifact but none exists yet.
    #[error("No artifact available: {0}")]
    NoArtifact(String),

    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two descriptors in one batch share a key.
    #[error("Duplicate task key in batch: {0}")]
    DuplicateTaskKey(String),

    /// Free-form input could not be turned into a request.
    #[error("Input analysis failed: {0}")]
    InputAnalysis(#[source] ServiceError),

    /// The document exporter failed.
    #[error("Export failed: {0}")]
    Export(#[source] ServiceError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Logging could not be initialized.
    #[error("Logging error: {0}")]
    Logging(String),
}

impl StoryloomError {
    /// Creates a stage failure.
    #[must_use]
    pub fn stage_failed(stage: RunStage, source: ServiceError) -> Self {
        Self::StageFailed { stage, source }
    }

    /// Returns the failure kind when the error wraps a service failure.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::StageFailed { source, .. }
            | Self::InputAnalysis(source)
            | Self::Export(source) => Some(source.kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display_matches_serde() {
        for kind in [
            ErrorKind::Transient,
            ErrorKind::QuotaExhausted,
            ErrorKind::MalformedResponse,
            ErrorKind::Fatal,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::json!(kind.to_string()));
        }
    }

    #[test]
    fn test_only_fatal_is_not_retryable() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(ErrorKind::QuotaExhausted.is_retryable());
        assert!(ErrorKind::MalformedResponse.is_retryable());
        assert!(!ErrorKind::Fatal.is_retryable());
    }

    #[test]
    fn test_classified_constructor() {
        let err = ServiceError::classified("Connection reset by peer");
        assert_eq!(err.kind, ErrorKind::Transient);
        assert_eq!(err.message, "Connection reset by peer");
    }

    #[test]
    fn test_dispatcher_errors() {
        assert_eq!(ServiceError::timeout().kind, ErrorKind::Transient);
        assert_eq!(ServiceError::timeout().message, "timeout");
        assert_eq!(ServiceError::skipped_quota().kind, ErrorKind::QuotaExhausted);
    }

    #[test]
    fn test_stage_failed_message() {
        let err = StoryloomError::stage_failed(
            RunStage::StructureGenerating,
            ServiceError::fatal("invalid api key"),
        );
        assert!(err.to_string().contains("structure_generating"));
        assert!(err.to_string().contains("invalid api key"));
        assert_eq!(err.kind(), Some(ErrorKind::Fatal));
    }
}
