//! Collaborator response types.

use crate::utils::base64_bytes;
use serde::{Deserialize, Serialize};

/// Sampling options for a text generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token budget.
    pub max_tokens: u32,
}

impl GenerationOptions {
    /// Creates options.
    #[must_use]
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }

    /// Story structure and page text.
    #[must_use]
    pub fn creative() -> Self {
        Self::new(0.8, 4000)
    }

    /// Image prompts.
    #[must_use]
    pub fn precise() -> Self {
        Self::new(0.3, 2000)
    }

    /// Free-form input analysis.
    #[must_use]
    pub fn analysis() -> Self {
        Self::new(0.7, 2000)
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::creative()
    }
}

/// Text model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
}

impl TextResponse {
    /// Creates a response carrying only content.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: None,
            input_tokens: None,
            output_tokens: None,
        }
    }

    /// Returns total tokens.
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.unwrap_or(0) + self.output_tokens.unwrap_or(0)
    }
}

/// Image model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageResponse {
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ImageResponse {
    /// Returns the byte count.
    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.bytes.len()
    }
}

/// Speech synthesis response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechResponse {
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub estimated_duration_seconds: f64,
}

impl SpeechResponse {
    /// Returns the byte count.
    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.bytes.len()
    }
}
