//! Session recording of remote calls.
//!
//! The recorder is an audit trail, separate from `tracing` logs. Every
//! remote call the controller makes produces one [`SessionRecord`].

mod recorder;

pub use recorder::{
    summarize_bytes, summarize_text, CollectingRecorder, LoggingRecorder, NoOpRecorder,
    SessionRecord, SessionRecorder,
};

/// Stage name of the story structure call.
pub const STAGE_STRUCTURE: &str = "story_structure";
/// Stage name of the page text call.
pub const STAGE_PAGES: &str = "story_pages";
/// Stage name of image prompt calls.
pub const STAGE_IMAGE_PROMPT: &str = "image_prompt";
/// Stage name of image calls.
pub const STAGE_IMAGE: &str = "image_generation";
/// Stage name of speech calls.
pub const STAGE_SPEECH: &str = "speech_synthesis";
/// Stage name of the input analysis call.
pub const STAGE_ANALYSIS: &str = "input_analysis";
/// Stage name of image calls made by regeneration.
pub const STAGE_REGENERATION: &str = "image_regeneration";
