//! Testing utilities for storyloom pipelines.
//!
//! This module provides:
//! - Scripted text, image and speech collaborators
//! - Canned requests, structures and artifacts
//! - Assertions for task results and batch outcomes

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{assert_outcome_keys, assert_task_failed_with, assert_task_succeeded};
pub use mocks::{
    RecordingExporter, ScriptedImageGenerator, ScriptedSpeechSynthesizer, ScriptedTextGenerator,
    TextRequestKind,
};
