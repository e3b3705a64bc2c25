//! Session recorder trait and implementations.

use crate::core::{RunStage, StoryRequest};
use crate::utils::{iso_timestamp, payload_digest};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Level};

const SUMMARY_LIMIT: usize = 200;

/// One audited remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Stage name, e.g. `image_generation`.
    pub stage: String,
    /// What was sent. Always populated.
    pub request_summary: String,
    /// What came back, or the failure.
    pub response_summary: String,
    /// Whether the call succeeded.
    pub success: bool,
    /// When the call finished (ISO 8601).
    pub recorded_at: String,
}

impl SessionRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        request_summary: impl Into<String>,
        response_summary: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            stage: stage.into(),
            request_summary: request_summary.into(),
            response_summary: response_summary.into(),
            success,
            recorded_at: iso_timestamp(),
        }
    }
}

/// Truncates `text` to a summary of at most 200 characters.
#[must_use]
pub fn summarize_text(text: &str) -> String {
    if text.chars().count() <= SUMMARY_LIMIT {
        return text.to_string();
    }
    let mut summary: String = text.chars().take(SUMMARY_LIMIT).collect();
    summary.push('…');
    summary
}

/// Describes a binary payload without embedding it.
#[must_use]
pub fn summarize_bytes(bytes: &[u8]) -> String {
    format!("{} bytes sha256:{}", bytes.len(), payload_digest(bytes))
}

/// Receives audit records. Recording never fails from the caller's view.
pub trait SessionRecorder: Send + Sync {
    /// Records one call.
    fn record(&self, record: SessionRecord);

    /// Called when a run starts.
    fn start_session(&self, _request: &StoryRequest) {}

    /// Called when a run ends, with its final state.
    fn finish_session(&self, _state: RunStage) {}
}

/// Discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRecorder;

impl SessionRecorder for NoOpRecorder {
    fn record(&self, _record: SessionRecord) {}
}

/// Forwards records to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingRecorder {
    level: Level,
}

impl Default for LoggingRecorder {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingRecorder {
    /// Creates a logging recorder with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level recorder.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl SessionRecorder for LoggingRecorder {
    fn record(&self, record: SessionRecord) {
        if !record.success {
            warn!(
                stage = %record.stage,
                request = %record.request_summary,
                response = %record.response_summary,
                "Call failed"
            );
        } else if self.level == Level::DEBUG {
            debug!(
                stage = %record.stage,
                request = %record.request_summary,
                response = %record.response_summary,
                "Call succeeded"
            );
        } else {
            info!(stage = %record.stage, response = %record.response_summary, "Call succeeded");
        }
    }

    fn start_session(&self, request: &StoryRequest) {
        info!(theme = %request.theme, character = %request.main_character, "Session started");
    }

    fn finish_session(&self, state: RunStage) {
        info!(state = %state, "Session finished");
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct CollectingRecorder {
    records: parking_lot::RwLock<Vec<SessionRecord>>,
    sessions: parking_lot::RwLock<Vec<RunStage>>,
}

impl CollectingRecorder {
    /// Creates a new collecting recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected records.
    #[must_use]
    pub fn records(&self) -> Vec<SessionRecord> {
        self.records.read().clone()
    }

    /// Returns the number of collected records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no records have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns records of one stage.
    #[must_use]
    pub fn records_for(&self, stage: &str) -> Vec<SessionRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.stage == stage)
            .cloned()
            .collect()
    }

    /// Final states of finished sessions, in order.
    #[must_use]
    pub fn finished_sessions(&self) -> Vec<RunStage> {
        self.sessions.read().clone()
    }

    /// Clears all collected records.
    pub fn clear(&self) {
        self.records.write().clear();
        self.sessions.write().clear();
    }
}

impl SessionRecorder for CollectingRecorder {
    fn record(&self, record: SessionRecord) {
        self.records.write().push(record);
    }

    fn finish_session(&self, state: RunStage) {
        self.sessions.write().push(state);
    }
}
