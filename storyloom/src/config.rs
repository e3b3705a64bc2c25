//! Run configuration.
//!
//! Every field has a default, so partial JSON documents and environment
//! overrides both layer on top of [`GenerationConfig::default`].

use crate::errors::StoryloomError;
use crate::pipeline::{BatchPolicy, RetryConfig};
use serde::{Deserialize, Serialize};

/// Environment variable overriding `max_pages`.
pub const ENV_MAX_PAGES: &str = "STORYLOOM_MAX_PAGES";
/// Environment variable overriding `voice_id`.
pub const ENV_VOICE_ID: &str = "STORYLOOM_VOICE_ID";
/// Environment variable overriding the image pool size.
pub const ENV_IMAGE_POOL_SIZE: &str = "STORYLOOM_IMAGE_POOL_SIZE";
/// Environment variable overriding the audio pool size.
pub const ENV_AUDIO_POOL_SIZE: &str = "STORYLOOM_AUDIO_POOL_SIZE";
/// Environment variable overriding the prompt pool size.
pub const ENV_PROMPT_POOL_SIZE: &str = "STORYLOOM_PROMPT_POOL_SIZE";

fn default_max_pages() -> usize {
    10
}

fn default_voice_id() -> String {
    "zh-CN-XiaoyiNeural".to_string()
}

fn default_prompt_batch() -> BatchPolicy {
    BatchPolicy::prompts()
}

fn default_image_batch() -> BatchPolicy {
    BatchPolicy::images()
}

fn default_audio_batch() -> BatchPolicy {
    BatchPolicy::audio()
}

/// Retry settings per call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicies {
    /// Story structure call.
    #[serde(default = "RetryPolicies::default_structure")]
    pub structure: RetryConfig,
    /// Page text call.
    #[serde(default = "RetryPolicies::default_pages")]
    pub pages: RetryConfig,
    /// Image prompt calls.
    #[serde(default = "RetryPolicies::default_prompts")]
    pub prompts: RetryConfig,
    /// Image calls, including regeneration.
    #[serde(default = "RetryPolicies::default_images")]
    pub images: RetryConfig,
    /// Speech calls.
    #[serde(default = "RetryPolicies::default_audio")]
    pub audio: RetryConfig,
    /// Input analysis call.
    #[serde(default = "RetryPolicies::default_analysis")]
    pub analysis: RetryConfig,
}

impl RetryPolicies {
    fn default_structure() -> RetryConfig {
        RetryConfig::new().with_max_retries(3)
    }

    fn default_pages() -> RetryConfig {
        RetryConfig::new().with_max_retries(3)
    }

    fn default_prompts() -> RetryConfig {
        RetryConfig::new().with_max_retries(2)
    }

    fn default_images() -> RetryConfig {
        RetryConfig::new().with_max_retries(3)
    }

    fn default_audio() -> RetryConfig {
        RetryConfig::new().with_max_retries(3).with_retry_on_quota(false)
    }

    fn default_analysis() -> RetryConfig {
        RetryConfig::new().with_max_retries(2)
    }

    /// Replaces every call site's config with `config`.
    #[must_use]
    pub fn uniform(config: RetryConfig) -> Self {
        Self {
            structure: config.clone(),
            pages: config.clone(),
            prompts: config.clone(),
            images: config.clone(),
            audio: config.clone(),
            analysis: config,
        }
    }

    fn iter(&self) -> [(&'static str, &RetryConfig); 6] {
        [
            ("structure", &self.structure),
            ("pages", &self.pages),
            ("prompts", &self.prompts),
            ("images", &self.images),
            ("audio", &self.audio),
            ("analysis", &self.analysis),
        ]
    }
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            structure: Self::default_structure(),
            pages: Self::default_pages(),
            prompts: Self::default_prompts(),
            images: Self::default_images(),
            audio: Self::default_audio(),
            analysis: Self::default_analysis(),
        }
    }
}

/// Configuration of one pipeline controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Upper bound on story pages.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Narration voice.
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    /// Image prompt batch.
    #[serde(default = "default_prompt_batch")]
    pub prompt_batch: BatchPolicy,
    /// Image batch.
    #[serde(default = "default_image_batch")]
    pub image_batch: BatchPolicy,
    /// Audio batch.
    #[serde(default = "default_audio_batch")]
    pub audio_batch: BatchPolicy,
    /// Retry settings.
    #[serde(default)]
    pub retries: RetryPolicies,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            voice_id: default_voice_id(),
            prompt_batch: default_prompt_batch(),
            image_batch: default_image_batch(),
            audio_batch: default_audio_batch(),
            retries: RetryPolicies::default(),
        }
    }
}

impl GenerationConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page limit.
    #[must_use]
    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages;
        self
    }

    /// Sets the narration voice.
    #[must_use]
    pub fn with_voice_id(mut self, voice: impl Into<String>) -> Self {
        self.voice_id = voice.into();
        self
    }

    /// Sets the image batch policy.
    #[must_use]
    pub fn with_image_batch(mut self, policy: BatchPolicy) -> Self {
        self.image_batch = policy;
        self
    }

    /// Sets the audio batch policy.
    #[must_use]
    pub fn with_audio_batch(mut self, policy: BatchPolicy) -> Self {
        self.audio_batch = policy;
        self
    }

    /// Sets the prompt batch policy.
    #[must_use]
    pub fn with_prompt_batch(mut self, policy: BatchPolicy) -> Self {
        self.prompt_batch = policy;
        self
    }

    /// Sets the retry policies.
    #[must_use]
    pub fn with_retries(mut self, retries: RetryPolicies) -> Self {
        self.retries = retries;
        self
    }

    /// Parses a (possibly partial) JSON document and validates it.
    pub fn from_json(json: &str) -> Result<Self, StoryloomError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `STORYLOOM_*` environment variables.
    pub fn from_env() -> Result<Self, StoryloomError> {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    /// Overlays values returned by `lookup` for the `STORYLOOM_*` names.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, StoryloomError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_MAX_PAGES) {
            self.max_pages = parse_var(ENV_MAX_PAGES, &v)?;
        }
        if let Some(v) = lookup(ENV_VOICE_ID) {
            self.voice_id = v;
        }
        if let Some(v) = lookup(ENV_IMAGE_POOL_SIZE) {
            self.image_batch.pool_size = parse_var(ENV_IMAGE_POOL_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_AUDIO_POOL_SIZE) {
            self.audio_batch.pool_size = parse_var(ENV_AUDIO_POOL_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_PROMPT_POOL_SIZE) {
            self.prompt_batch.pool_size = parse_var(ENV_PROMPT_POOL_SIZE, &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<(), StoryloomError> {
        if self.max_pages == 0 {
            return Err(StoryloomError::Config("max_pages must be at least 1".to_string()));
        }
        if self.voice_id.trim().is_empty() {
            return Err(StoryloomError::Config("voice_id must not be empty".to_string()));
        }
        self.prompt_batch.validate("prompt_batch")?;
        self.image_batch.validate("image_batch")?;
        self.audio_batch.validate("audio_batch")?;
        for (name, retry) in self.retries.iter() {
            if !(retry.backoff_factor >= 1.0) {
                return Err(StoryloomError::Config(format!(
                    "retries.{name}: backoff_factor must be >= 1.0, got {}",
                    retry.backoff_factor
                )));
            }
        }
        Ok(())
    }
}

fn parse_var(name: &str, value: &str) -> Result<usize, StoryloomError> {
    value
        .trim()
        .parse()
        .map_err(|e| StoryloomError::Config(format!("{name}={value:?}: {e}")))
}
