//! Scripted collaborators for testing.
//!
//! The fakes answer deterministically and can be told to fail a number of
//! times. They count calls so tests can check retry and skip behavior.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::fixtures;
use crate::core::{page_key, Artifact, COVER_KEY};
use crate::errors::ServiceError;
use crate::providers::{
    DocumentExporter, GenerationOptions, ImageGenerator, ImageResponse, SpeechResponse,
    SpeechSynthesizer, TextGenerator, TextResponse,
};

/// A failure to return for the next `remaining` matching calls.
#[derive(Debug, Clone)]
struct Scripted {
    error: ServiceError,
    remaining: usize,
}

impl Scripted {
    /// Consumes one failure if any is left.
    fn take(&mut self) -> Option<ServiceError> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.error.clone())
    }
}

fn take_failure(failures: &Mutex<HashMap<String, Scripted>>, key: &str) -> Option<ServiceError> {
    failures.lock().get_mut(key).and_then(Scripted::take)
}

/// The kind of text request, told apart by the request's opening words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextRequestKind {
    /// Story structure.
    Structure,
    /// Page text.
    Pages,
    /// Cover image prompt.
    CoverPrompt,
    /// Page image prompt.
    PagePrompt,
    /// Input analysis.
    Analysis,
    /// Anything else.
    Other,
}

impl TextRequestKind {
    /// Classifies a request built by [`crate::prompts`].
    #[must_use]
    pub fn of(prompt: &str) -> Self {
        if prompt.starts_with("Write a children's story about") {
            Self::Structure
        } else if prompt.starts_with("Based on this story structure") {
            Self::Pages
        } else if prompt.starts_with("Write an English illustration prompt for a children's book cover") {
            Self::CoverPrompt
        } else if prompt.starts_with("Write an English illustration prompt for page") {
            Self::PagePrompt
        } else if prompt.starts_with("A user wants a children's picture book") {
            Self::Analysis
        } else {
            Self::Other
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Pages => "pages",
            Self::CoverPrompt => "cover_prompt",
            Self::PagePrompt => "page_prompt",
            Self::Analysis => "analysis",
            Self::Other => "other",
        }
    }
}

/// Extracts `N` from "... for page N of ...".
fn page_number(prompt: &str) -> Option<usize> {
    let rest = prompt.split("for page ").nth(1)?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// A text generator that writes a whole storybook.
///
/// Image prompts come back as `scene <key> illustration`, so image fakes
/// can fail by key.
#[derive(Debug)]
pub struct ScriptedTextGenerator {
    pages: usize,
    structure: String,
    analysis: String,
    failures: Mutex<HashMap<String, Scripted>>,
    call_counts: Mutex<HashMap<TextRequestKind, usize>>,
}

impl ScriptedTextGenerator {
    /// Creates a generator producing `pages` pages.
    #[must_use]
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            structure: fixtures::structure_json(),
            analysis: r#"{"theme": "sharing", "character": "Pip the fox", "setting": "the Whispering Forest",
                "character_desc": "a small red fox", "scene_desc": "golden birches"}"#
                .to_string(),
            failures: Mutex::new(HashMap::new()),
            call_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the structure response.
    #[must_use]
    pub fn with_structure(mut self, text: impl Into<String>) -> Self {
        self.structure = text.into();
        self
    }

    /// Replaces the analysis response.
    #[must_use]
    pub fn with_analysis(mut self, text: impl Into<String>) -> Self {
        self.analysis = text.into();
        self
    }

    /// Fails the next `times` requests of `kind` with `error`.
    #[must_use]
    pub fn failing(self, kind: TextRequestKind, error: ServiceError, times: usize) -> Self {
        self.failures
            .lock()
            .insert(kind.name().to_string(), Scripted { error, remaining: times });
        self
    }

    /// Fails the next `times` prompt requests for `key` (`cover` or `page_N`).
    #[must_use]
    pub fn failing_prompt(self, key: &str, error: ServiceError, times: usize) -> Self {
        self.failures
            .lock()
            .insert(format!("prompt:{key}"), Scripted { error, remaining: times });
        self
    }

    /// Number of requests of `kind` received.
    #[must_use]
    pub fn call_count(&self, kind: TextRequestKind) -> usize {
        self.call_counts.lock().get(&kind).copied().unwrap_or(0)
    }

    /// Total requests received.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.call_counts.lock().values().sum()
    }
}

#[async_trait]
impl TextGenerator for ScriptedTextGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<TextResponse, ServiceError> {
        let kind = TextRequestKind::of(prompt);
        *self.call_counts.lock().entry(kind).or_insert(0) += 1;

        if let Some(error) = take_failure(&self.failures, kind.name()) {
            return Err(error);
        }

        let key = match kind {
            TextRequestKind::CoverPrompt => Some(COVER_KEY.to_string()),
            TextRequestKind::PagePrompt => page_number(prompt).map(page_key),
            _ => None,
        };
        if let Some(key) = &key {
            if let Some(error) = take_failure(&self.failures, &format!("prompt:{key}")) {
                return Err(error);
            }
        }

        let content = match kind {
            TextRequestKind::Structure => self.structure.clone(),
            TextRequestKind::Pages => fixtures::pages_text(self.pages),
            TextRequestKind::CoverPrompt | TextRequestKind::PagePrompt => {
                format!("scene {} illustration", key.unwrap_or_default())
            }
            TextRequestKind::Analysis => self.analysis.clone(),
            TextRequestKind::Other => String::new(),
        };
        Ok(TextResponse::new(content))
    }
}

/// An image generator that can fail by task key.
#[derive(Debug, Default)]
pub struct ScriptedImageGenerator {
    delay: Option<Duration>,
    failures: Mutex<HashMap<String, Scripted>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedImageGenerator {
    /// Creates a generator that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fails the next `times` requests for `key` with `error`.
    #[must_use]
    pub fn failing(self, key: &str, error: ServiceError, times: usize) -> Self {
        self.fail(key, error, times);
        self
    }

    /// Fails the next `times` requests for `key` with `error`.
    pub fn fail(&self, key: &str, error: ServiceError, times: usize) {
        self.failures
            .lock()
            .insert(key.to_string(), Scripted { error, remaining: times });
    }

    /// Number of requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }

    /// Prompts received, in arrival order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Number of requests whose prompt belongs to `key`.
    #[must_use]
    pub fn calls_for(&self, key: &str) -> usize {
        let marker = format!("scene {key} ");
        self.prompts.lock().iter().filter(|p| p.starts_with(&marker)).count()
    }
}

#[async_trait]
impl ImageGenerator for ScriptedImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<ImageResponse, ServiceError> {
        self.prompts.lock().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let key = prompt
            .strip_prefix("scene ")
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or_default();
        if let Some(error) = take_failure(&self.failures, key) {
            return Err(error);
        }
        Ok(fixtures::image_response(prompt.as_bytes()))
    }
}

/// A speech synthesizer that can fail its next calls.
#[derive(Debug, Default)]
pub struct ScriptedSpeechSynthesizer {
    failure: Mutex<Option<Scripted>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedSpeechSynthesizer {
    /// Creates a synthesizer that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `times` calls with `error`.
    #[must_use]
    pub fn failing(self, error: ServiceError, times: usize) -> Self {
        *self.failure.lock() = Some(Scripted { error, remaining: times });
        self
    }

    /// Number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// `(text, voice_id)` of each call.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSpeechSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<SpeechResponse, ServiceError> {
        self.calls.lock().push((text.to_string(), voice_id.to_string()));
        if let Some(error) = self.failure.lock().as_mut().and_then(Scripted::take) {
            return Err(error);
        }
        Ok(fixtures::speech_response(text))
    }
}

/// An exporter that remembers what it exported.
#[derive(Debug, Default)]
pub struct RecordingExporter {
    exported: Mutex<Vec<String>>,
}

impl RecordingExporter {
    /// Creates a new exporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of exported artifacts.
    #[must_use]
    pub fn exported(&self) -> Vec<String> {
        self.exported.lock().clone()
    }
}

#[async_trait]
impl DocumentExporter for RecordingExporter {
    async fn export(&self, artifact: &Artifact) -> Result<PathBuf, ServiceError> {
        self.exported.lock().push(artifact.id.clone());
        Ok(PathBuf::from(format!("{}.pdf", artifact.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StoryStructure;
    use crate::errors::ErrorKind;
    use crate::prompts;

    #[test]
    fn test_request_kinds_match_builders() {
        let request = fixtures::story_request();
        let structure = fixtures::structure();
        assert_eq!(
            TextRequestKind::of(&prompts::structure_request(&request)),
            TextRequestKind::Structure
        );
        assert_eq!(
            TextRequestKind::of(&prompts::pages_request(&structure, 10)),
            TextRequestKind::Pages
        );
        assert_eq!(
            TextRequestKind::of(&prompts::cover_prompt_request(&structure)),
            TextRequestKind::CoverPrompt
        );
        let page_prompt = prompts::page_prompt_request(&structure, "text", 7);
        assert_eq!(TextRequestKind::of(&page_prompt), TextRequestKind::PagePrompt);
        assert_eq!(page_number(&page_prompt), Some(7));
        assert_eq!(
            TextRequestKind::of(&prompts::analysis_request("x")),
            TextRequestKind::Analysis
        );
    }

    #[tokio::test]
    async fn test_scripted_text_failures_run_out() {
        let text = ScriptedTextGenerator::new(2).failing(
            TextRequestKind::Structure,
            ServiceError::transient("timeout"),
            1,
        );
        let prompt = prompts::structure_request(&fixtures::story_request());
        let options = GenerationOptions::creative();

        assert!(text.generate(&prompt, &options).await.is_err());
        let response = text.generate(&prompt, &options).await.unwrap();
        let parsed: StoryStructure = crate::core::story::parse_structure(&response.content).unwrap();
        assert_eq!(parsed, fixtures::structure());
        assert_eq!(text.call_count(TextRequestKind::Structure), 2);
    }

    #[tokio::test]
    async fn test_scripted_image_fails_by_key() {
        let images = ScriptedImageGenerator::new().failing(
            "page_2",
            ServiceError::quota_exhausted("RESOURCE_EXHAUSTED"),
            1,
        );
        let err = images.generate("scene page_2 illustration, style").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::QuotaExhausted);
        assert!(images.generate("scene page_2 illustration, style").await.is_ok());
        assert!(images.generate("scene page_20 illustration, style").await.is_ok());
        assert_eq!(images.calls_for("page_2"), 2);
        assert_eq!(images.call_count(), 3);
    }
}
