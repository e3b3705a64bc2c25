//! The pipeline controller.
//!
//! One run goes structure → pages → prompts → {images ∥ audio} → assembly.
//! Structure and page text are single guarded calls whose failure aborts
//! the run. Prompt, image and audio batches never abort: failed units end
//! up as failed [`TaskResult`]s in a partially successful [`Artifact`].
//!
//! The controller owns the current artifact. Batch workers hand results
//! back and never touch it.

use super::breaker::QuotaBreaker;
use super::dispatcher::Dispatcher;
use super::retry;
use crate::config::GenerationConfig;
use crate::core::story::{parse_analysis, parse_pages, parse_structure};
use crate::core::{
    page_key, Artifact, BatchOutcome, CoverArtifact, GenerationStats, PageArtifact,
    RegenerationTarget, RunStage, StoryRequest, StoryStructure, TaskDescriptor, TaskResult,
    TaskVariant, COVER_KEY,
};
use crate::errors::{ErrorKind, ServiceError, StoryloomError};
use crate::events::{
    summarize_bytes, summarize_text, NoOpRecorder, SessionRecord, SessionRecorder, STAGE_ANALYSIS,
    STAGE_IMAGE, STAGE_IMAGE_PROMPT, STAGE_PAGES, STAGE_REGENERATION, STAGE_SPEECH,
    STAGE_STRUCTURE,
};
use crate::prompts;
use crate::providers::{
    DocumentExporter, GenerationOptions, ImageGenerator, ImageResponse, SpeechResponse,
    SpeechSynthesizer, TextGenerator, TextResponse,
};
use crate::utils::{generate_artifact_id, iso_timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const COVER_FALLBACK_TEXT: &str = "the book cover";

/// Quota state observed by the most recent image work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    /// True if the last image batch or regeneration hit quota exhaustion.
    pub quota_exhausted: bool,
    /// When it was last observed (ISO 8601).
    pub last_check: Option<String>,
}

/// The result of a regeneration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerationOutcome {
    /// Entries selected for regeneration.
    pub attempted: usize,
    /// Entries whose image now succeeded.
    pub regenerated: usize,
    /// Keys of the selected entries, pages first.
    pub keys: Vec<String>,
}

/// A final image prompt and whether it came from the fallback builder.
#[derive(Debug, Clone)]
struct PlannedPrompt {
    prompt: String,
    fallback: bool,
}

/// Sequences the stages of a run and owns the current artifact.
pub struct PipelineController {
    text: Arc<dyn TextGenerator>,
    images: Arc<dyn ImageGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
    recorder: Arc<dyn SessionRecorder>,
    config: GenerationConfig,
    state: RwLock<RunStage>,
    current: RwLock<Option<Artifact>>,
    quota: RwLock<QuotaStatus>,
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("config", &self.config)
            .field("state", &*self.state.read())
            .field("has_artifact", &self.current.read().is_some())
            .finish_non_exhaustive()
    }
}

impl PipelineController {
    /// Creates a controller. Fails if `config` is invalid.
    pub fn new(
        text: Arc<dyn TextGenerator>,
        images: Arc<dyn ImageGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
        config: GenerationConfig,
    ) -> Result<Self, StoryloomError> {
        config.validate()?;
        Ok(Self {
            text,
            images,
            speech,
            recorder: Arc::new(NoOpRecorder),
            config,
            state: RwLock::new(RunStage::Idle),
            current: RwLock::new(None),
            quota: RwLock::new(QuotaStatus::default()),
        })
    }

    /// Sets the session recorder.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn SessionRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// The lifecycle state of the latest run.
    #[must_use]
    pub fn state(&self) -> RunStage {
        *self.state.read()
    }

    /// A copy of the current artifact.
    #[must_use]
    pub fn current_artifact(&self) -> Option<Artifact> {
        self.current.read().clone()
    }

    /// Quota state from the most recent image work.
    #[must_use]
    pub fn quota_status(&self) -> QuotaStatus {
        self.quota.read().clone()
    }

    /// Runs the whole pipeline. On success the artifact also becomes the
    /// current one.
    ///
    /// Returns [`StoryloomError::StageFailed`] when structure or page text
    /// generation fails; no batch is submitted in that case.
    pub async fn run(&self, request: &StoryRequest) -> Result<Artifact, StoryloomError> {
        info!(theme = %request.theme, character = %request.main_character, "Starting run");
        self.recorder.start_session(request);

        match self.execute_run(request).await {
            Ok(artifact) => {
                *self.current.write() = Some(artifact.clone());
                self.transition(RunStage::Complete);
                self.recorder.finish_session(RunStage::Complete);
                info!(
                    artifact_id = %artifact.id,
                    pages = artifact.pages.len(),
                    succeeded_images = artifact.stats.succeeded_images,
                    failed_images = artifact.stats.failed_images,
                    "Run complete"
                );
                Ok(artifact)
            }
            Err(e) => {
                self.transition(RunStage::Failed);
                self.recorder.finish_session(RunStage::Failed);
                error!(error = %e, "Run failed");
                Err(e)
            }
        }
    }

    async fn execute_run(&self, request: &StoryRequest) -> Result<Artifact, StoryloomError> {
        self.transition(RunStage::StructureGenerating);
        let structure = self
            .generate_structure(request)
            .await
            .map_err(|e| StoryloomError::stage_failed(RunStage::StructureGenerating, e))?;

        self.transition(RunStage::PagesGenerating);
        let pages = self
            .generate_pages(&structure)
            .await
            .map_err(|e| StoryloomError::stage_failed(RunStage::PagesGenerating, e))?;

        self.transition(RunStage::PromptsGenerating);
        let prompt_outcome = self.generate_prompts(&structure, &pages).await?;
        let planned = plan_prompts(&structure, &pages, prompt_outcome);

        self.transition(RunStage::MediaGenerating);
        let (images, audio) = tokio::join!(
            self.generate_images(&pages, &planned),
            self.generate_audio(&structure, &pages),
        );
        let (images, audio) = (images?, audio?);

        self.transition(RunStage::Assembling);
        *self.quota.write() = QuotaStatus {
            quota_exhausted: images.any_quota_exhausted(),
            last_check: Some(iso_timestamp()),
        };
        Ok(assemble(request, structure, pages, planned, images, audio))
    }

    fn transition(&self, next: RunStage) {
        let mut state = self.state.write();
        let from = *state;
        if !from.can_transition_to(next) {
            warn!(from = %from, to = %next, "Unexpected state transition");
        }
        debug!(from = %from, to = %next, "State transition");
        *state = next;
    }

    async fn generate_structure(&self, request: &StoryRequest) -> Result<StoryStructure, ServiceError> {
        let prompt = prompts::structure_request(request);
        let (text, recorder, prompt) = (self.text.as_ref(), self.recorder.as_ref(), prompt.as_str());

        let result = retry::execute(&self.config.retries.structure, STAGE_STRUCTURE, move || async move {
            let response =
                text_call(text, recorder, STAGE_STRUCTURE, prompt, GenerationOptions::creative()).await?;
            parse_structure(&response.content)
        })
        .await;

        let mut structure = match result {
            Ok(structure) => structure,
            Err(e) if e.kind == ErrorKind::MalformedResponse => {
                warn!(error = %e, "Structure unparseable, using fallback structure");
                StoryStructure::fallback()
            }
            Err(e) => return Err(e),
        };
        structure.apply_request_defaults(request);
        Ok(structure)
    }

    async fn generate_pages(&self, structure: &StoryStructure) -> Result<Vec<String>, ServiceError> {
        let prompt = prompts::pages_request(structure, self.config.max_pages);
        let (text, recorder, prompt) = (self.text.as_ref(), self.recorder.as_ref(), prompt.as_str());
        let max_pages = self.config.max_pages;

        retry::execute(&self.config.retries.pages, STAGE_PAGES, move || async move {
            let response =
                text_call(text, recorder, STAGE_PAGES, prompt, GenerationOptions::creative()).await?;
            parse_pages(&response.content, max_pages)
        })
        .await
    }

    async fn generate_prompts(
        &self,
        structure: &StoryStructure,
        pages: &[String],
    ) -> Result<BatchOutcome<String>, StoryloomError> {
        let mut tasks: Vec<TaskDescriptor<String>> = pages
            .iter()
            .enumerate()
            .map(|(i, text)| {
                TaskDescriptor::page(i + 1, prompts::page_prompt_request(structure, text, i + 1))
            })
            .collect();
        tasks.push(TaskDescriptor::cover(prompts::cover_prompt_request(structure)));

        let text = Arc::clone(&self.text);
        let recorder = Arc::clone(&self.recorder);
        Dispatcher::new("prompts", self.config.prompt_batch, self.config.retries.prompts.clone())
            .run(tasks, move |task: Arc<TaskDescriptor<String>>| {
                let text = Arc::clone(&text);
                let recorder = Arc::clone(&recorder);
                async move { prompt_call(text.as_ref(), recorder.as_ref(), task.payload()).await }
            })
            .await
    }

    async fn generate_images(
        &self,
        pages: &[String],
        planned: &HashMap<String, PlannedPrompt>,
    ) -> Result<BatchOutcome<ImageResponse>, StoryloomError> {
        let prompt_for = |key: &str| planned.get(key).map(|p| p.prompt.clone()).unwrap_or_default();
        let mut tasks: Vec<TaskDescriptor<String>> = (1..=pages.len())
            .map(|n| TaskDescriptor::page(n, prompt_for(&page_key(n))))
            .collect();
        tasks.push(TaskDescriptor::cover(prompt_for(COVER_KEY)));

        let images = Arc::clone(&self.images);
        let recorder = Arc::clone(&self.recorder);
        Dispatcher::new("images", self.config.image_batch, self.config.retries.images.clone())
            .with_breaker(Arc::new(QuotaBreaker::new()))
            .run(tasks, move |task: Arc<TaskDescriptor<String>>| {
                let images = Arc::clone(&images);
                let recorder = Arc::clone(&recorder);
                async move { image_call(images.as_ref(), recorder.as_ref(), STAGE_IMAGE, task.payload()).await }
            })
            .await
    }

    async fn generate_audio(
        &self,
        structure: &StoryStructure,
        pages: &[String],
    ) -> Result<BatchOutcome<SpeechResponse>, StoryloomError> {
        let mut tasks: Vec<TaskDescriptor<String>> = pages
            .iter()
            .enumerate()
            .map(|(i, text)| TaskDescriptor::page(i + 1, text.clone()))
            .collect();
        tasks.push(TaskDescriptor::cover(prompts::cover_narration(structure)));

        let speech = Arc::clone(&self.speech);
        let recorder = Arc::clone(&self.recorder);
        let voice: Arc<str> = Arc::from(self.config.voice_id.as_str());
        Dispatcher::new("audio", self.config.audio_batch, self.config.retries.audio.clone())
            .run(tasks, move |task: Arc<TaskDescriptor<String>>| {
                let speech = Arc::clone(&speech);
                let recorder = Arc::clone(&recorder);
                let voice = Arc::clone(&voice);
                async move { speech_call(speech.as_ref(), recorder.as_ref(), task.payload(), &voice).await }
            })
            .await
    }

    /// Regenerates failed images of `artifact` in place, one at a time.
    ///
    /// An entry is selected when its image failed and, if `target_keys` is
    /// given, its key is listed. Only the selected entries' image results
    /// change; stats are recomputed afterwards.
    pub async fn regenerate(
        &self,
        artifact: &mut Artifact,
        target_keys: Option<&[String]>,
    ) -> RegenerationOutcome {
        let targets = artifact.regeneration_targets(target_keys);
        let mut outcome = RegenerationOutcome {
            attempted: targets.len(),
            ..RegenerationOutcome::default()
        };
        if targets.is_empty() {
            info!(artifact_id = %artifact.id, "Nothing to regenerate");
            return outcome;
        }
        info!(artifact_id = %artifact.id, count = targets.len(), "Regenerating images");

        for target in targets {
            let base = self.regeneration_prompt(&artifact.structure, &target).await;
            let prompt = prompts::consistent_prompt(&base, target.variant);
            let (images, recorder, prompt) = (self.images.as_ref(), self.recorder.as_ref(), prompt.as_str());

            let result = retry::execute_task(&self.config.retries.images, &target.key, move || async move {
                image_call(images, recorder, STAGE_REGENERATION, prompt).await
            })
            .await;

            if result.success {
                outcome.regenerated += 1;
            }
            debug!(key = %target.key, success = result.success, "Regenerated image");
            if let Some(slot) = artifact.image_result_mut(&target.key) {
                *slot = result;
            }
            outcome.keys.push(target.key);
        }

        artifact.refresh_image_stats();
        *self.quota.write() = QuotaStatus {
            quota_exhausted: artifact.stats.quota_exhausted,
            last_check: Some(iso_timestamp()),
        };
        info!(
            attempted = outcome.attempted,
            regenerated = outcome.regenerated,
            "Regeneration finished"
        );
        outcome
    }

    async fn regeneration_prompt(&self, structure: &StoryStructure, target: &RegenerationTarget) -> String {
        let request = match target.variant {
            TaskVariant::Cover => prompts::cover_prompt_request(structure),
            TaskVariant::Page => prompts::page_prompt_request(structure, &target.text, target.ordinal),
        };
        let (text, recorder, request) = (self.text.as_ref(), self.recorder.as_ref(), request.as_str());

        match retry::execute(&self.config.retries.prompts, &target.key, move || async move {
            prompt_call(text, recorder, request).await
        })
        .await
        {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(key = %target.key, error = %e, "Prompt failed, using fallback prompt");
                prompts::fallback_image_prompt(structure, fallback_subject(target))
            }
        }
    }

    /// Regenerates failed images of the current artifact.
    pub async fn regenerate_current(
        &self,
        target_keys: Option<&[String]>,
    ) -> Result<RegenerationOutcome, StoryloomError> {
        let mut artifact = self
            .current_artifact()
            .ok_or_else(|| StoryloomError::NoArtifact("nothing to regenerate".to_string()))?;
        let outcome = self.regenerate(&mut artifact, target_keys).await;

        let mut current = self.current.write();
        if current.as_ref().is_some_and(|a| a.id == artifact.id) {
            *current = Some(artifact);
        } else {
            warn!(artifact_id = %artifact.id, "Current artifact replaced during regeneration");
        }
        Ok(outcome)
    }

    /// Extracts a request from free-form user input.
    pub async fn analyze_input(&self, user_input: &str) -> Result<StoryRequest, StoryloomError> {
        let prompt = prompts::analysis_request(user_input);
        let (text, recorder, prompt) = (self.text.as_ref(), self.recorder.as_ref(), prompt.as_str());

        retry::execute(&self.config.retries.analysis, STAGE_ANALYSIS, move || async move {
            let response =
                text_call(text, recorder, STAGE_ANALYSIS, prompt, GenerationOptions::analysis()).await?;
            parse_analysis(&response.content)
        })
        .await
        .map_err(StoryloomError::InputAnalysis)
    }

    /// Hands the current artifact to `exporter`.
    pub async fn export_current(
        &self,
        exporter: &dyn DocumentExporter,
    ) -> Result<PathBuf, StoryloomError> {
        let artifact = self
            .current_artifact()
            .ok_or_else(|| StoryloomError::NoArtifact("nothing to export".to_string()))?;
        let path = exporter.export(&artifact).await.map_err(StoryloomError::Export)?;
        info!(artifact_id = %artifact.id, path = %path.display(), "Artifact exported");
        Ok(path)
    }
}

fn fallback_subject(target: &RegenerationTarget) -> &str {
    match target.variant {
        TaskVariant::Cover => COVER_FALLBACK_TEXT,
        TaskVariant::Page => &target.text,
    }
}

/// Picks each entry's final image prompt, falling back where the prompt
/// task failed.
fn plan_prompts(
    structure: &StoryStructure,
    pages: &[String],
    mut outcome: BatchOutcome<String>,
) -> HashMap<String, PlannedPrompt> {
    let entries = pages
        .iter()
        .enumerate()
        .map(|(i, text)| (page_key(i + 1), TaskVariant::Page, text.as_str()))
        .chain(std::iter::once((COVER_KEY.to_string(), TaskVariant::Cover, COVER_FALLBACK_TEXT)));

    entries
        .map(|(key, variant, text)| {
            let generated = outcome.take(&key).and_then(|r| r.value);
            let fallback = generated.is_none();
            if fallback {
                warn!(key = %key, "Prompt missing, using fallback prompt");
            }
            let base = generated.unwrap_or_else(|| prompts::fallback_image_prompt(structure, text));
            let planned = PlannedPrompt {
                prompt: prompts::consistent_prompt(&base, variant),
                fallback,
            };
            (key, planned)
        })
        .collect()
}

fn missing<T>(key: &str) -> TaskResult<T> {
    TaskResult::failed(key, ServiceError::fatal("generation failed"))
}

/// Merges the media batches into an artifact, by key.
fn assemble(
    request: &StoryRequest,
    structure: StoryStructure,
    pages: Vec<String>,
    mut planned: HashMap<String, PlannedPrompt>,
    mut images: BatchOutcome<ImageResponse>,
    mut audio: BatchOutcome<SpeechResponse>,
) -> Artifact {
    let stats = GenerationStats::from_outcomes(&images, &audio);
    let mut take_prompt = |key: &str| {
        planned.remove(key).unwrap_or(PlannedPrompt {
            prompt: String::new(),
            fallback: true,
        })
    };

    let page_artifacts = pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let key = page_key(i + 1);
            let prompt = take_prompt(&key);
            PageArtifact {
                page_number: i + 1,
                text,
                image_prompt: prompt.prompt,
                prompt_fallback: prompt.fallback,
                image_result: images.take(&key).unwrap_or_else(|| missing(&key)),
                audio_result: audio.take(&key).unwrap_or_else(|| missing(&key)),
            }
        })
        .collect();

    let cover_prompt = take_prompt(COVER_KEY);
    let cover = CoverArtifact {
        text: prompts::cover_narration(&structure),
        image_prompt: cover_prompt.prompt,
        prompt_fallback: cover_prompt.fallback,
        image_result: images.take(COVER_KEY).unwrap_or_else(|| missing(COVER_KEY)),
        audio_result: audio.take(COVER_KEY).unwrap_or_else(|| missing(COVER_KEY)),
    };

    Artifact {
        id: generate_artifact_id(),
        request: request.clone(),
        structure,
        pages: page_artifacts,
        cover,
        stats,
        created_at: iso_timestamp(),
    }
}

async fn text_call(
    text: &dyn TextGenerator,
    recorder: &dyn SessionRecorder,
    stage: &str,
    prompt: &str,
    options: GenerationOptions,
) -> Result<TextResponse, ServiceError> {
    let result = text.generate(prompt, &options).await;
    let response_summary = match &result {
        Ok(response) => summarize_text(&response.content),
        Err(e) => e.to_string(),
    };
    recorder.record(SessionRecord::new(
        stage,
        summarize_text(prompt),
        response_summary,
        result.is_ok(),
    ));
    result
}

async fn prompt_call(
    text: &dyn TextGenerator,
    recorder: &dyn SessionRecorder,
    request: &str,
) -> Result<String, ServiceError> {
    let response =
        text_call(text, recorder, STAGE_IMAGE_PROMPT, request, GenerationOptions::precise()).await?;
    let prompt = response.content.trim();
    if prompt.is_empty() {
        return Err(ServiceError::malformed("empty image prompt"));
    }
    Ok(prompt.to_string())
}

async fn image_call(
    images: &dyn ImageGenerator,
    recorder: &dyn SessionRecorder,
    stage: &str,
    prompt: &str,
) -> Result<ImageResponse, ServiceError> {
    let result = images.generate(prompt).await;
    let response_summary = match &result {
        Ok(image) => format!("{}x{} {}", image.width, image.height, summarize_bytes(&image.bytes)),
        Err(e) => e.to_string(),
    };
    recorder.record(SessionRecord::new(
        stage,
        summarize_text(prompt),
        response_summary,
        result.is_ok(),
    ));
    result
}

async fn speech_call(
    speech: &dyn SpeechSynthesizer,
    recorder: &dyn SessionRecorder,
    text: &str,
    voice_id: &str,
) -> Result<SpeechResponse, ServiceError> {
    let result = speech.synthesize(text, voice_id).await;
    let response_summary = match &result {
        Ok(clip) => format!(
            "{:.1}s {}",
            clip.estimated_duration_seconds,
            summarize_bytes(&clip.bytes)
        ),
        Err(e) => e.to_string(),
    };
    recorder.record(SessionRecord::new(
        STAGE_SPEECH,
        format!("voice={voice_id} {}", summarize_text(text)),
        response_summary,
        result.is_ok(),
    ));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicies;
    use crate::events::CollectingRecorder;
    use crate::pipeline::RetryConfig;
    use crate::providers::{MockImageGenerator, MockSpeechSynthesizer, MockTextGenerator};
    use crate::testing::{
        fixtures, RecordingExporter, ScriptedImageGenerator, ScriptedSpeechSynthesizer,
        ScriptedTextGenerator, TextRequestKind,
    };
    use pretty_assertions::assert_eq;

    fn fast_config(pages: usize) -> GenerationConfig {
        GenerationConfig::default()
            .with_max_pages(pages)
            .with_retries(RetryPolicies::uniform(
                RetryConfig::new().with_max_retries(2).with_base_delay_ms(1).with_jitter(false),
            ))
    }

    fn controller(text: ScriptedTextGenerator, pages: usize) -> PipelineController {
        PipelineController::new(
            Arc::new(text),
            Arc::new(ScriptedImageGenerator::new()),
            Arc::new(ScriptedSpeechSynthesizer::new()),
            fast_config(pages),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = PipelineController::new(
            Arc::new(ScriptedTextGenerator::new(1)),
            Arc::new(ScriptedImageGenerator::new()),
            Arc::new(ScriptedSpeechSynthesizer::new()),
            GenerationConfig::default().with_max_pages(0),
        )
        .unwrap_err();
        assert!(matches!(err, StoryloomError::Config(_)));
    }

    #[tokio::test]
    async fn test_run_produces_complete_artifact() {
        let recorder = Arc::new(CollectingRecorder::new());
        let controller = controller(ScriptedTextGenerator::new(3), 3).with_recorder(recorder.clone());
        assert_eq!(controller.state(), RunStage::Idle);

        let artifact = controller.run(&fixtures::story_request()).await.unwrap();

        assert_eq!(controller.state(), RunStage::Complete);
        assert_eq!(artifact.pages.len(), 3);
        assert_eq!(artifact.pages[2].text, "Pip walks to berry bush number 3.");
        assert_eq!(artifact.structure, fixtures::structure());
        assert_eq!(artifact.stats.total_images, 4);
        assert_eq!(artifact.stats.succeeded_images, 4);
        assert_eq!(artifact.stats.succeeded_audio, 4);
        assert!(!artifact.stats.breaker_tripped);
        assert!(artifact.cover.image_prompt.starts_with("scene cover illustration"));
        assert_eq!(artifact.cover.text, fixtures::structure().story_overview);
        assert!(artifact.pages.iter().all(|p| !p.prompt_fallback));
        assert_eq!(controller.current_artifact(), Some(artifact));

        assert_eq!(recorder.records_for(STAGE_STRUCTURE).len(), 1);
        assert_eq!(recorder.records_for(STAGE_IMAGE_PROMPT).len(), 4);
        assert_eq!(recorder.records_for(STAGE_IMAGE).len(), 4);
        assert_eq!(recorder.records_for(STAGE_SPEECH).len(), 4);
        assert_eq!(recorder.finished_sessions(), vec![RunStage::Complete]);
    }

    #[tokio::test]
    async fn test_structure_fatal_aborts_without_batches() {
        let mut text = MockTextGenerator::new();
        text.expect_generate()
            .times(1)
            .returning(|_, _| Err(ServiceError::classified("401 invalid api key")));
        let mut images = MockImageGenerator::new();
        images.expect_generate().never();
        let mut speech = MockSpeechSynthesizer::new();
        speech.expect_synthesize().never();

        let controller = PipelineController::new(
            Arc::new(text),
            Arc::new(images),
            Arc::new(speech),
            fast_config(3),
        )
        .unwrap();

        let err = controller.run(&fixtures::story_request()).await.unwrap_err();
        assert!(matches!(
            err,
            StoryloomError::StageFailed { stage: RunStage::StructureGenerating, .. }
        ));
        assert_eq!(err.kind(), Some(ErrorKind::Fatal));
        assert_eq!(controller.state(), RunStage::Failed);
        assert!(controller.current_artifact().is_none());
    }

    #[tokio::test]
    async fn test_unparseable_structure_uses_fallback() {
        let text = ScriptedTextGenerator::new(2).with_structure("Once upon a time, no JSON.");
        let controller = controller(text, 2);
        let artifact = controller.run(&fixtures::story_request()).await.unwrap();

        assert_eq!(artifact.structure.story_overview, StoryStructure::fallback().story_overview);
        assert_eq!(artifact.structure.setting.name, "Fantasy World");
    }

    #[tokio::test]
    async fn test_pages_failure_aborts() {
        let text = ScriptedTextGenerator::new(2).failing(
            TextRequestKind::Pages,
            ServiceError::transient("503 service unavailable"),
            usize::MAX,
        );
        let scripted = Arc::new(text);
        let controller = PipelineController::new(
            scripted.clone(),
            Arc::new(ScriptedImageGenerator::new()),
            Arc::new(ScriptedSpeechSynthesizer::new()),
            fast_config(2),
        )
        .unwrap();

        let err = controller.run(&fixtures::story_request()).await.unwrap_err();
        assert!(matches!(
            err,
            StoryloomError::StageFailed { stage: RunStage::PagesGenerating, .. }
        ));
        assert_eq!(scripted.call_count(TextRequestKind::Pages), 3);
        assert_eq!(scripted.call_count(TextRequestKind::PagePrompt), 0);
    }

    #[tokio::test]
    async fn test_failed_prompt_uses_fallback() {
        let text = ScriptedTextGenerator::new(2).failing_prompt(
            "page_2",
            ServiceError::fatal("content policy"),
            usize::MAX,
        );
        let controller = controller(text, 2);
        let artifact = controller.run(&fixtures::story_request()).await.unwrap();

        let page = &artifact.pages[1];
        assert!(page.prompt_fallback);
        assert!(page.image_prompt.starts_with("scene tall birches"));
        assert!(page.image_result.success);
        assert!(!artifact.pages[0].prompt_fallback);
    }

    #[tokio::test]
    async fn test_analyze_input() {
        let controller = controller(ScriptedTextGenerator::new(1), 1);
        let request = controller.analyze_input("a fox who learns to share").await.unwrap();
        assert_eq!(request.main_character, "Pip the fox");
        assert_eq!(request.scene_desc.as_deref(), Some("golden birches"));

        let bad = controller_with_analysis("not json at all");
        let err = bad.analyze_input("x").await.unwrap_err();
        assert!(matches!(err, StoryloomError::InputAnalysis(_)));
        assert_eq!(err.kind(), Some(ErrorKind::MalformedResponse));
    }

    fn controller_with_analysis(text: &str) -> PipelineController {
        controller(ScriptedTextGenerator::new(1).with_analysis(text), 1)
    }

    #[tokio::test]
    async fn test_export_current() {
        let controller = controller(ScriptedTextGenerator::new(1), 1);
        let exporter = RecordingExporter::new();

        let err = controller.export_current(&exporter).await.unwrap_err();
        assert!(matches!(err, StoryloomError::NoArtifact(_)));

        let artifact = controller.run(&fixtures::story_request()).await.unwrap();
        let path = controller.export_current(&exporter).await.unwrap();
        assert_eq!(path, PathBuf::from(format!("{}.pdf", artifact.id)));
        assert_eq!(exporter.exported(), vec![artifact.id]);
    }

    #[tokio::test]
    async fn test_regenerate_current_without_artifact() {
        let controller = controller(ScriptedTextGenerator::new(1), 1);
        let err = controller.regenerate_current(None).await.unwrap_err();
        assert!(matches!(err, StoryloomError::NoArtifact(_)));
    }
}
