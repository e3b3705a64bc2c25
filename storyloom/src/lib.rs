//! # Storyloom
//!
//! Fan-out/fan-in orchestration for multi-stage picture-book generation.
//!
//! A run turns a [`StoryRequest`](core::StoryRequest) into an
//! [`Artifact`](core::Artifact):
//!
//! - **Primary stages**: story structure and page text, each a single
//!   retried call whose failure aborts the run
//! - **Bounded batches**: image prompts, images and narration fan out over
//!   fixed-size worker pools with per-task timeouts
//! - **Failure isolation**: every failed unit is recorded against its key
//!   and the run still completes
//! - **Quota breaker**: the first quota exhaustion in an image batch skips
//!   the tasks that have not started yet
//! - **Selective regeneration**: failed images can be retried later
//!   without touching anything that succeeded
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use storyloom::prelude::*;
//!
//! let controller = PipelineController::new(text, images, speech, GenerationConfig::from_env()?)?
//!     .with_recorder(Arc::new(LoggingRecorder::default()));
//!
//! let artifact = controller.run(&StoryRequest::new("sharing", "Pip the fox", "a forest")).await?;
//! if artifact.stats.failed_images > 0 {
//!     controller.regenerate_current(None).await?;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{GenerationConfig, RetryPolicies};
    pub use crate::core::{
        Artifact, BatchOutcome, CoverArtifact, GenerationStats, PageArtifact, RunStage,
        StoryRequest, StoryStructure, TaskDescriptor, TaskResult, TaskVariant,
    };
    pub use crate::errors::{ErrorKind, ServiceError, StoryloomError};
    pub use crate::events::{
        CollectingRecorder, LoggingRecorder, NoOpRecorder, SessionRecord, SessionRecorder,
    };
    pub use crate::observability::{init_logging, LogFormat, LoggingConfig};
    pub use crate::pipeline::{
        classify, BatchPolicy, Dispatcher, PipelineController, QuotaBreaker, QuotaStatus,
        RegenerationOutcome, RetryConfig,
    };
    pub use crate::providers::{
        DocumentExporter, GenerationOptions, ImageGenerator, ImageResponse, SpeechResponse,
        SpeechSynthesizer, TextGenerator, TextResponse,
    };
    pub use crate::utils::{generate_artifact_id, iso_timestamp, Timestamp};
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn prelude_exposes_controller_types() {
        let config = GenerationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(RunStage::default(), RunStage::Idle);
    }
}
