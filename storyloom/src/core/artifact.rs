//! The assembled multi-page artifact of one run.

use super::{page_key, BatchOutcome, StoryRequest, StoryStructure, TaskResult, TaskVariant, COVER_KEY};
use crate::providers::{ImageResponse, SpeechResponse};
use serde::{Deserialize, Serialize};

/// One illustrated, narrated page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageArtifact {
    /// 1-based page number.
    pub page_number: usize,
    /// Page text.
    pub text: String,
    /// The prompt the image was generated from.
    pub image_prompt: String,
    /// True when the prompt task failed and a fallback prompt was used.
    #[serde(default)]
    pub prompt_fallback: bool,
    /// Image outcome.
    pub image_result: TaskResult<ImageResponse>,
    /// Narration outcome.
    pub audio_result: TaskResult<SpeechResponse>,
}

/// The book cover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverArtifact {
    /// Narration text read on the cover.
    pub text: String,
    /// The prompt the image was generated from.
    pub image_prompt: String,
    /// True when the prompt task failed and a fallback prompt was used.
    #[serde(default)]
    pub prompt_fallback: bool,
    /// Image outcome.
    pub image_result: TaskResult<ImageResponse>,
    /// Narration outcome.
    pub audio_result: TaskResult<SpeechResponse>,
}

/// Aggregate counts a caller uses to decide whether to regenerate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Image tasks in the run (pages + cover).
    pub total_images: usize,
    /// Successful images.
    pub succeeded_images: usize,
    /// Failed images.
    pub failed_images: usize,
    /// True if any image failed with quota exhaustion.
    pub quota_exhausted: bool,
    /// True if the image batch's breaker tripped.
    pub breaker_tripped: bool,
    /// Audio tasks in the run.
    pub total_audio: usize,
    /// Successful audio tasks.
    pub succeeded_audio: usize,
}

impl GenerationStats {
    /// Computes stats from the two media batches.
    #[must_use]
    pub fn from_outcomes(
        images: &BatchOutcome<ImageResponse>,
        audio: &BatchOutcome<SpeechResponse>,
    ) -> Self {
        Self {
            total_images: images.attempted,
            succeeded_images: images.succeeded,
            failed_images: images.failed(),
            quota_exhausted: images.any_quota_exhausted(),
            breaker_tripped: images.breaker_tripped,
            total_audio: audio.attempted,
            succeeded_audio: audio.succeeded,
        }
    }
}

/// A page or cover selected for image regeneration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegenerationTarget {
    /// Task key (`cover` or `page_N`).
    pub key: String,
    /// Page number, 0 for the cover.
    pub ordinal: usize,
    /// Cover or page.
    pub variant: TaskVariant,
    /// Page text (empty for the cover).
    pub text: String,
}

/// The output of one full pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique artifact id.
    pub id: String,
    /// The request that produced it.
    pub request: StoryRequest,
    /// The story structure.
    pub structure: StoryStructure,
    /// Pages in order.
    pub pages: Vec<PageArtifact>,
    /// The cover.
    pub cover: CoverArtifact,
    /// Aggregate statistics.
    pub stats: GenerationStats,
    /// When the artifact was assembled (ISO 8601).
    pub created_at: String,
}

impl Artifact {
    /// Returns the entries whose image failed, optionally restricted to
    /// `targets`. Pages come first in page order, then the cover.
    #[must_use]
    pub fn regeneration_targets(&self, targets: Option<&[String]>) -> Vec<RegenerationTarget> {
        let wanted = |key: &str| targets.map_or(true, |t| t.iter().any(|k| k == key));

        let mut selected: Vec<RegenerationTarget> = self
            .pages
            .iter()
            .filter(|p| !p.image_result.success)
            .map(|p| (page_key(p.page_number), p))
            .filter(|(key, _)| wanted(key))
            .map(|(key, p)| RegenerationTarget {
                key,
                ordinal: p.page_number,
                variant: TaskVariant::Page,
                text: p.text.clone(),
            })
            .collect();

        if !self.cover.image_result.success && wanted(COVER_KEY) {
            selected.push(RegenerationTarget {
                key: COVER_KEY.to_string(),
                ordinal: 0,
                variant: TaskVariant::Cover,
                text: String::new(),
            });
        }
        selected
    }

    /// Mutable access to the image result stored under `key`.
    pub fn image_result_mut(&mut self, key: &str) -> Option<&mut TaskResult<ImageResponse>> {
        if key == COVER_KEY {
            return Some(&mut self.cover.image_result);
        }
        self.pages
            .iter_mut()
            .find(|p| page_key(p.page_number) == key)
            .map(|p| &mut p.image_result)
    }

    /// Recomputes the image counts from the stored entries.
    pub fn refresh_image_stats(&mut self) {
        let results = self
            .pages
            .iter()
            .map(|p| &p.image_result)
            .chain(std::iter::once(&self.cover.image_result));

        let (mut total, mut succeeded, mut quota) = (0, 0, false);
        for result in results {
            total += 1;
            if result.success {
                succeeded += 1;
            }
            quota |= result.is_quota_exhausted();
        }

        self.stats.total_images = total;
        self.stats.succeeded_images = succeeded;
        self.stats.failed_images = total - succeeded;
        self.stats.quota_exhausted = quota;
    }

    /// Keys of entries whose image failed, pages first.
    #[must_use]
    pub fn failed_image_keys(&self) -> Vec<String> {
        self.regeneration_targets(None)
            .into_iter()
            .map(|t| t.key)
            .collect()
    }
}
