//! Canned domain values.

use crate::core::{
    page_key, Artifact, CharacterProfile, CharacterType, CoverArtifact, GenerationStats,
    PageArtifact, SettingProfile, StoryRequest, StoryStructure, TaskResult, COVER_KEY,
};
use crate::errors::ServiceError;
use crate::providers::{ImageResponse, SpeechResponse};

/// Pages in [`artifact_with_failures`].
pub const FIXTURE_PAGES: usize = 3;

/// A request about a fox in a forest.
#[must_use]
pub fn story_request() -> StoryRequest {
    StoryRequest::new("sharing", "Pip the fox", "the Whispering Forest")
        .with_character_desc("a small red fox with a white-tipped tail")
}

/// The structure matching [`structure_json`].
#[must_use]
pub fn structure() -> StoryStructure {
    StoryStructure {
        story_overview: "Pip learns that berries taste better when shared".to_string(),
        main_character: CharacterProfile {
            name: "Pip the fox".to_string(),
            character_type: CharacterType::NonHuman,
            description: Some("a small red fox with a white-tipped tail".to_string()),
            hair_color: Some("red".to_string()),
            eye_color: Some("amber".to_string()),
            ..CharacterProfile::default()
        },
        setting: SettingProfile {
            name: "the Whispering Forest".to_string(),
            description: "tall birches in golden afternoon light".to_string(),
        },
        supporting_characters: Vec::new(),
    }
}

/// Structure text as a text service would return it.
#[must_use]
pub fn structure_json() -> String {
    let json = serde_json::to_string_pretty(&structure()).unwrap_or_default();
    format!("Here is the structure:\n```json\n{json}\n```")
}

/// `pages` lines of labeled page text.
#[must_use]
pub fn pages_text(pages: usize) -> String {
    (1..=pages)
        .map(|n| format!("Page {n}: Pip walks to berry bush number {n}."))
        .collect::<Vec<_>>()
        .join("\n")
}

/// An image with the given bytes.
#[must_use]
pub fn image_response(bytes: &[u8]) -> ImageResponse {
    ImageResponse {
        bytes: bytes.to_vec(),
        width: 1024,
        height: 1024,
        model: Some("scripted".to_string()),
    }
}

/// A short narration clip.
#[must_use]
pub fn speech_response(text: &str) -> SpeechResponse {
    SpeechResponse {
        bytes: text.as_bytes().to_vec(),
        estimated_duration_seconds: crate::prompts::estimate_narration_seconds(text),
    }
}

fn image_result(key: &str, failed: bool) -> TaskResult<ImageResponse> {
    if failed {
        TaskResult::failed(key, ServiceError::transient("timeout"))
    } else {
        TaskResult::succeeded(key, image_response(key.as_bytes()))
    }
}

/// A three-page artifact whose images failed for `failed_pages` (and the
/// cover when `cover_failed`). Audio always succeeded.
#[must_use]
pub fn artifact_with_failures(failed_pages: &[&str], cover_failed: bool) -> Artifact {
    let pages = (1..=FIXTURE_PAGES)
        .map(|n| {
            let key = page_key(n);
            let text = format!("Pip walks to berry bush number {n}.");
            PageArtifact {
                page_number: n,
                image_prompt: format!("scene {key} illustration"),
                prompt_fallback: false,
                image_result: image_result(&key, failed_pages.contains(&key.as_str())),
                audio_result: TaskResult::succeeded(key.clone(), speech_response(&text)),
                text,
            }
        })
        .collect();

    let cover = CoverArtifact {
        text: structure().story_overview,
        image_prompt: "scene cover illustration".to_string(),
        prompt_fallback: false,
        image_result: image_result(COVER_KEY, cover_failed),
        audio_result: TaskResult::succeeded(COVER_KEY, speech_response("cover")),
    };

    let mut artifact = Artifact {
        id: "story_fixture".to_string(),
        request: story_request(),
        structure: structure(),
        pages,
        cover,
        stats: GenerationStats {
            total_audio: FIXTURE_PAGES + 1,
            succeeded_audio: FIXTURE_PAGES + 1,
            ..GenerationStats::default()
        },
        created_at: "2024-01-01T00:00:00.000000+00:00".to_string(),
    };
    artifact.refresh_image_stats();
    artifact
}
