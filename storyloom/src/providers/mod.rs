//! Remote collaborators the controller drives.
//!
//! Every method reports failure as a [`ServiceError`]. Implementations that
//! only have an opaque error message should build it with
//! [`ServiceError::classified`] so the retry policy sees a sensible kind.

mod responses;

pub use responses::{GenerationOptions, ImageResponse, SpeechResponse, TextResponse};

use crate::core::Artifact;
use crate::errors::ServiceError;
use async_trait::async_trait;
use std::path::PathBuf;

/// A text model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates text for a prompt.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TextResponse, ServiceError>;
}

/// An image model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generates one image for a prompt.
    async fn generate(&self, prompt: &str) -> Result<ImageResponse, ServiceError>;
}

/// A text-to-speech engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesizes narration for `text` in `voice_id`.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<SpeechResponse, ServiceError>;
}

/// Writes an artifact to a document and returns its path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentExporter: Send + Sync {
    /// Exports the artifact.
    async fn export(&self, artifact: &Artifact) -> Result<PathBuf, ServiceError>;
}
