//! Failure classification.
//!
//! Classification is best-effort: it matches keywords in the failure text
//! and is not exhaustive. Collaborators that see structured status codes
//! should prefer [`classify_status`].

use crate::errors::ErrorKind;

const QUOTA_KEYWORDS: &[&str] = &[
    "quota",
    "resource_exhausted",
    "resource exhausted",
    "too many requests",
    "rate limit",
];

const TRANSIENT_KEYWORDS: &[&str] = &[
    "timeout",
    "timed out",
    "network",
    "connection",
    "temporary",
    "server error",
    "service unavailable",
    "bad gateway",
];

const MALFORMED_KEYWORDS: &[&str] = &["json", "parse"];

/// Classifies a raw failure message. Matching is case-insensitive.
///
/// Quota keywords win over transient ones, so
/// `"quota exceeded, connection closed"` is [`ErrorKind::QuotaExhausted`].
#[must_use]
pub fn classify(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if matches(QUOTA_KEYWORDS) {
        ErrorKind::QuotaExhausted
    } else if matches(TRANSIENT_KEYWORDS) {
        ErrorKind::Transient
    } else if matches(MALFORMED_KEYWORDS) {
        ErrorKind::MalformedResponse
    } else {
        ErrorKind::Fatal
    }
}

/// Classifies an HTTP-like status code.
#[must_use]
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        429 => ErrorKind::QuotaExhausted,
        408 | 500 | 502 | 503 | 504 => ErrorKind::Transient,
        _ => ErrorKind::Fatal,
    }
}
