//! Request text sent to the text service, and image prompt finishing.

use crate::core::{CharacterProfile, CharacterType, StoryRequest, StoryStructure, TaskVariant};
use std::fmt::Write as _;

const NOT_SPECIFIED: &str = "Not specified";

const STYLE_SUFFIX: &str =
    "children's book illustration, soft watercolor, warm colors, friendly atmosphere";
const CHARACTER_CONSISTENCY: &str = "same character appearance throughout all images";
const SCENE_CONSISTENCY: &str = "consistent art style and lighting";

const IMAGE_STYLE: &str = "style A painterly gouache illustration for a children's book. \
No text, no words, no letters, no Chinese characters, no English text in the image. \
Child-safe content only, no violence, no blood, no scary elements.";

const DEFAULT_COVER_NARRATION: &str = "Welcome to our story world";

/// Asks for the story structure as a JSON object.
#[must_use]
pub fn structure_request(request: &StoryRequest) -> String {
    let mut text = format!(
        "Write a children's story about {} in {}.\nTheme: {}\n",
        request.main_character, request.setting, request.theme
    );
    if let Some(desc) = &request.character_desc {
        let _ = writeln!(text, "Character notes: {desc}");
    }
    if let Some(desc) = &request.scene_desc {
        let _ = writeln!(text, "Scene notes: {desc}");
    }
    text.push_str(
        "\nReply with one JSON object with the keys story_overview, main_character \
(name, character_type human/non_human, gender, ethnicity, race, age, skin_tone, body_type, \
hair_color, hair_style, eye_color, facial_features, clothing, accessories, personality, \
special_features), setting (name, description) and supporting_characters (same shape as \
main_character).",
    );
    text
}

/// Asks for `max_pages` pages of story text.
#[must_use]
pub fn pages_request(structure: &StoryStructure, max_pages: usize) -> String {
    format!(
        "Based on this story structure, write {max_pages} pages of about 50 words each.\n\
Overview: {}\nMain character: {} - {}\nSetting: {} - {}\n\n\
Output plain story text only, one page per line:\nPage 1: ...\nPage 2: ...\n...\nPage {max_pages}: ...",
        structure.story_overview,
        structure.main_character.name,
        structure.main_character.description.as_deref().unwrap_or_default(),
        structure.setting.name,
        structure.setting.description,
    )
}

/// Asks for the cover illustration prompt.
#[must_use]
pub fn cover_prompt_request(structure: &StoryStructure) -> String {
    format!(
        "Write an English illustration prompt for a children's book cover.\n\
Story overview: {}\n\nMain character:\n{}\n\nSetting:\nName: {}\nDescription: {}\n\n\
Use the format: scene [...] subjects [full standardized character description, then pose] {IMAGE_STYLE}",
        structure.story_overview,
        format_character(&structure.main_character),
        structure.setting.name,
        structure.setting.description,
    )
}

/// Asks for the illustration prompt of page `page_number`.
#[must_use]
pub fn page_prompt_request(structure: &StoryStructure, page_text: &str, page_number: usize) -> String {
    let mut supporting = String::new();
    for character in &structure.supporting_characters {
        supporting.push_str(&format_character(character));
        supporting.push_str("\n\n");
    }
    format!(
        "Write an English illustration prompt for page {page_number} of a children's book.\n\
Page text: {page_text}\n\nMain character:\n{}\n\nSetting:\nName: {}\nDescription: {}\n\n\
Supporting characters:\n{supporting}\
Use the format: scene [...] subjects [every character with all attributes, then action and \
expression] {IMAGE_STYLE}\nThe main character must look identical on every page.",
        format_character(&structure.main_character),
        structure.setting.name,
        structure.setting.description,
    )
}

/// Asks for story elements extracted from free-form user input.
#[must_use]
pub fn analysis_request(user_input: &str) -> String {
    format!(
        "A user wants a children's picture book and wrote:\n\"{user_input}\"\n\n\
Stay faithful to the input. Infer what is missing. Reply with one JSON object:\n\
{{\"theme\": \"...\", \"character\": \"...\", \"setting\": \"...\", \
\"character_desc\": \"...\", \"scene_desc\": \"...\"}}"
    )
}

/// Formats a character as a standardized attribute listing.
#[must_use]
pub fn format_character(profile: &CharacterProfile) -> String {
    fn attr(value: Option<&String>) -> &str {
        value.map_or(NOT_SPECIFIED, String::as_str)
    }

    let mut lines = Vec::new();
    if !profile.name.is_empty() {
        lines.push(format!("Name: {}", profile.name));
    }
    match profile.character_type {
        CharacterType::Human => {
            lines.push("Character Type: Human".to_string());
            lines.push(format!("Gender: {}", attr(profile.gender.as_ref())));
            lines.push(format!("Ethnicity: {}", attr(profile.ethnicity.as_ref())));
            lines.push(format!("Race: {}", attr(profile.race.as_ref())));
            lines.push(format!("Age: {}", attr(profile.age.as_ref())));
            lines.push(format!("Skin Tone: {}", attr(profile.skin_tone.as_ref())));
            lines.push(format!("Body Type: {}", attr(profile.body_type.as_ref())));
            lines.push(format!("Hair Color: {}", attr(profile.hair_color.as_ref())));
            lines.push(format!("Hair Style: {}", attr(profile.hair_style.as_ref())));
            lines.push(format!("Eye Color: {}", attr(profile.eye_color.as_ref())));
            lines.push(format!("Facial Features: {}", attr(profile.facial_features.as_ref())));
            lines.push(format!("Clothing: {}", attr(profile.clothing.as_ref())));
            lines.push(format!(
                "Accessories: {}",
                profile.accessories.as_deref().unwrap_or("None")
            ));
        }
        CharacterType::NonHuman => {
            let coat = profile.skin_tone.as_ref().or(profile.hair_color.as_ref());
            lines.push("Character Type: Non-Human".to_string());
            lines.push(format!("Race: {}", attr(profile.race.as_ref())));
            lines.push(format!("Age: {}", attr(profile.age.as_ref())));
            lines.push(format!("Fur/Skin Color: {}", attr(coat)));
            lines.push(format!("Body Type: {}", attr(profile.body_type.as_ref())));
            lines.push(format!("Eye Color: {}", attr(profile.eye_color.as_ref())));
            lines.push(format!("Facial Features: {}", attr(profile.facial_features.as_ref())));
            lines.push(format!("Clothing: {}", attr(profile.clothing.as_ref())));
            lines.push(format!(
                "Accessories: {}",
                profile.accessories.as_deref().unwrap_or("None")
            ));
            lines.push(format!(
                "Special Features: {}",
                attr(profile.special_features.as_ref())
            ));
        }
    }
    lines.join("\n")
}

/// The deterministic prompt used when prompt generation fails.
#[must_use]
pub fn fallback_image_prompt(structure: &StoryStructure, page_text: &str) -> String {
    let scene = if structure.setting.description.is_empty() {
        "a magical children's book setting"
    } else {
        structure.setting.description.as_str()
    };
    let subject = structure
        .main_character
        .description
        .as_deref()
        .filter(|d| !d.is_empty())
        .unwrap_or("a friendly children's book character");
    format!("scene {scene} subjects {subject} performing actions related to: {page_text} {IMAGE_STYLE}")
}

/// Appends the style and consistency suffixes sent with every image call.
#[must_use]
pub fn consistent_prompt(base: &str, variant: TaskVariant) -> String {
    let mut prompt = format!("{base}, {STYLE_SUFFIX}");
    if variant == TaskVariant::Page {
        prompt.push_str(", ");
        prompt.push_str(CHARACTER_CONSISTENCY);
    }
    prompt.push_str(", ");
    prompt.push_str(SCENE_CONSISTENCY);
    prompt
}

/// Text narrated on the cover.
#[must_use]
pub fn cover_narration(structure: &StoryStructure) -> String {
    let overview = structure.story_overview.trim();
    if overview.is_empty() {
        DEFAULT_COVER_NARRATION.to_string()
    } else {
        overview.to_string()
    }
}

/// Estimated narration length: 0.15s per character, at least 2s.
#[must_use]
pub fn estimate_narration_seconds(text: &str) -> f64 {
    (text.chars().count() as f64 * 0.15).max(2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SettingProfile;

    fn fox() -> CharacterProfile {
        CharacterProfile {
            name: "Fox".to_string(),
            character_type: CharacterType::NonHuman,
            hair_color: Some("red".to_string()),
            eye_color: Some("amber".to_string()),
            ..CharacterProfile::default()
        }
    }

    #[test]
    fn test_format_character_non_human() {
        let text = format_character(&fox());
        assert!(text.starts_with("Name: Fox\nCharacter Type: Non-Human"));
        assert!(text.contains("Fur/Skin Color: red"));
        assert!(text.contains("Eye Color: amber"));
        assert!(text.contains("Accessories: None"));
        assert!(!text.contains("Hair Style"));
    }

    #[test]
    fn test_format_character_human() {
        let profile = CharacterProfile {
            name: "Mia".to_string(),
            character_type: CharacterType::Human,
            age: Some("7".to_string()),
            ..CharacterProfile::default()
        };
        let text = format_character(&profile);
        assert!(text.contains("Character Type: Human"));
        assert!(text.contains("Age: 7"));
        assert!(text.contains("Gender: Not specified"));
        assert!(text.contains("Hair Style: Not specified"));
    }

    #[test]
    fn test_consistent_prompt_cover_has_no_character_suffix() {
        let cover = consistent_prompt("scene x", TaskVariant::Cover);
        let page = consistent_prompt("scene x", TaskVariant::Page);
        assert!(!cover.contains(CHARACTER_CONSISTENCY));
        assert!(page.contains(CHARACTER_CONSISTENCY));
        assert!(cover.ends_with(SCENE_CONSISTENCY));
        assert!(page.ends_with(SCENE_CONSISTENCY));
    }

    #[test]
    fn test_fallback_prompt_uses_structure() {
        let structure = StoryStructure {
            setting: SettingProfile {
                name: "Forest".to_string(),
                description: "sunny woods".to_string(),
            },
            ..StoryStructure::default()
        };
        let prompt = fallback_image_prompt(&structure, "The fox finds a berry.");
        assert!(prompt.starts_with("scene sunny woods subjects a friendly children's book character"));
        assert!(prompt.contains("The fox finds a berry."));

        let bare = fallback_image_prompt(&StoryStructure::default(), "x");
        assert!(bare.starts_with("scene a magical children's book setting"));
    }

    #[test]
    fn test_cover_narration() {
        assert_eq!(cover_narration(&StoryStructure::default()), DEFAULT_COVER_NARRATION);
        let structure = StoryStructure {
            story_overview: "A fox learns to share".to_string(),
            ..StoryStructure::default()
        };
        assert_eq!(cover_narration(&structure), "A fox learns to share");
    }

    #[test]
    fn test_estimate_narration_seconds() {
        assert!((estimate_narration_seconds("hi") - 2.0).abs() < f64::EPSILON);
        assert!((estimate_narration_seconds(&"a".repeat(100)) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_requests_mention_inputs() {
        let request = StoryRequest::new("sharing", "Fox", "forest").with_scene_desc("autumn");
        let text = structure_request(&request);
        assert!(text.contains("Fox") && text.contains("forest") && text.contains("autumn"));

        let mut structure = StoryStructure::fallback();
        structure.supporting_characters.push(fox());
        assert!(pages_request(&structure, 4).contains("Page 4:"));
        assert!(page_prompt_request(&structure, "text", 3).contains("page 3"));
        assert!(page_prompt_request(&structure, "text", 3).contains("Name: Fox"));
        assert!(cover_prompt_request(&structure).contains("Little Hero"));
        assert!(analysis_request("a brave turtle").contains("a brave turtle"));
    }
}
