//! Story inputs and the structure parsed from model output.

use crate::errors::ServiceError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static JSON_BLOCK: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").ok());

static PAGE_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*page\s*(\d+)\s*[:：]\s*(.+?)\s*$").ok());

/// The input of one generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryRequest {
    /// Story theme.
    pub theme: String,
    /// Name of the main character.
    pub main_character: String,
    /// Where the story takes place.
    pub setting: String,
    /// Optional character description supplied by the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_desc: Option<String>,
    /// Optional scene description supplied by the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_desc: Option<String>,
}

impl StoryRequest {
    /// Creates a request without descriptions.
    #[must_use]
    pub fn new(
        theme: impl Into<String>,
        main_character: impl Into<String>,
        setting: impl Into<String>,
    ) -> Self {
        Self {
            theme: theme.into(),
            main_character: main_character.into(),
            setting: setting.into(),
            character_desc: None,
            scene_desc: None,
        }
    }

    /// Sets the character description.
    #[must_use]
    pub fn with_character_desc(mut self, desc: impl Into<String>) -> Self {
        self.character_desc = Some(desc.into());
        self
    }

    /// Sets the scene description.
    #[must_use]
    pub fn with_scene_desc(mut self, desc: impl Into<String>) -> Self {
        self.scene_desc = Some(desc.into());
        self
    }
}

/// Human or not; decides which attribute set describes the character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterType {
    /// A human character.
    Human,
    /// Animals, creatures, objects.
    #[default]
    #[serde(other)]
    NonHuman,
}

/// A standardized character description kept identical across illustrations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct CharacterProfile {
    pub name: String,
    pub character_type: CharacterType,
    pub description: Option<String>,
    pub gender: Option<String>,
    pub ethnicity: Option<String>,
    pub race: Option<String>,
    pub age: Option<String>,
    pub skin_tone: Option<String>,
    pub body_type: Option<String>,
    pub hair_color: Option<String>,
    pub hair_style: Option<String>,
    pub eye_color: Option<String>,
    pub facial_features: Option<String>,
    pub clothing: Option<String>,
    pub accessories: Option<String>,
    pub personality: Option<String>,
    pub special_features: Option<String>,
}

/// Where the story happens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingProfile {
    /// Setting name.
    pub name: String,
    /// Environment, mood, colors, light.
    pub description: String,
}

/// The output of the structure stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryStructure {
    /// One-paragraph plot summary.
    pub story_overview: String,
    /// The protagonist.
    pub main_character: CharacterProfile,
    /// The setting.
    pub setting: SettingProfile,
    /// Other recurring characters.
    pub supporting_characters: Vec<CharacterProfile>,
}

impl StoryStructure {
    /// The structure used when the model never returns a parseable one.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            story_overview: "A children's story full of adventure and friendship".to_string(),
            main_character: CharacterProfile {
                name: "Little Hero".to_string(),
                description: Some("a brave and kind character".to_string()),
                personality: Some("brave, kind, helpful".to_string()),
                ..CharacterProfile::default()
            },
            setting: SettingProfile {
                name: "Fantasy World".to_string(),
                description: "a beautiful world full of magic and wonder".to_string(),
            },
            supporting_characters: Vec::new(),
        }
    }

    /// Fills empty names and descriptions from the request.
    pub fn apply_request_defaults(&mut self, request: &StoryRequest) {
        if self.main_character.name.is_empty() {
            self.main_character.name.clone_from(&request.main_character);
        }
        if self.main_character.description.is_none() {
            self.main_character.description.clone_from(&request.character_desc);
        }
        if self.setting.name.is_empty() {
            self.setting.name.clone_from(&request.setting);
        }
        if self.setting.description.is_empty() {
            if let Some(desc) = &request.scene_desc {
                self.setting.description.clone_from(desc);
            }
        }
    }
}

/// Returns the outermost `{ ... }` span of `text`, if any.
#[must_use]
pub fn extract_json_block(text: &str) -> Option<&str> {
    JSON_BLOCK.as_ref()?.find(text).map(|m| m.as_str())
}

/// Parses a structure from model output.
pub fn parse_structure(text: &str) -> Result<StoryStructure, ServiceError> {
    let block = extract_json_block(text)
        .ok_or_else(|| ServiceError::malformed("no JSON object in structure response"))?;
    serde_json::from_str(block)
        .map_err(|e| ServiceError::malformed(format!("structure JSON parse error: {e}")))
}

/// Splits model output into at most `max_pages` page texts.
///
/// `Page N: text` lines are preferred; when they yield fewer than
/// `max_pages` pages, blank-line separated paragraphs are used instead.
pub fn parse_pages(text: &str, max_pages: usize) -> Result<Vec<String>, ServiceError> {
    let mut pages: Vec<String> = PAGE_LINE
        .as_ref()
        .map(|re| {
            re.captures_iter(text)
                .filter_map(|c| c.get(2))
                .map(|m| m.as_str().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if pages.len() < max_pages {
        pages = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ToString::to_string)
            .collect();
    }

    pages.truncate(max_pages);
    if pages.is_empty() {
        return Err(ServiceError::malformed("no pages in story response"));
    }
    Ok(pages)
}

#[derive(Debug, Deserialize)]
struct InputAnalysis {
    theme: String,
    character: String,
    setting: String,
    character_desc: String,
    scene_desc: String,
}

/// Parses the input-analysis response into a request.
pub fn parse_analysis(text: &str) -> Result<StoryRequest, ServiceError> {
    let block = extract_json_block(text)
        .ok_or_else(|| ServiceError::malformed("no JSON object in analysis response"))?;
    let analysis: InputAnalysis = serde_json::from_str(block)
        .map_err(|e| ServiceError::malformed(format!("analysis JSON parse error: {e}")))?;
    Ok(StoryRequest::new(analysis.theme, analysis.character, analysis.setting)
        .with_character_desc(analysis.character_desc)
        .with_scene_desc(analysis.scene_desc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_json_block_ignores_fences() {
        let text = "Here you go:\n```json\n{\"a\": {\"b\": 1}}\n```\nEnjoy";
        assert_eq!(extract_json_block(text), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_block("no json here"), None);
    }

    #[test]
    fn test_parse_structure() {
        let text = r#"{
            "story_overview": "A fox learns to share",
            "main_character": {"name": "Fox", "character_type": "non_human", "eye_color": "amber"},
            "setting": {"name": "Forest", "description": "sunny woods"}
        }"#;
        let structure = parse_structure(text).unwrap();
        assert_eq!(structure.story_overview, "A fox learns to share");
        assert_eq!(structure.main_character.character_type, CharacterType::NonHuman);
        assert_eq!(structure.main_character.eye_color.as_deref(), Some("amber"));
        assert!(structure.supporting_characters.is_empty());
    }

    #[test]
    fn test_parse_structure_unknown_character_type() {
        let text = r#"{"main_character": {"name": "Robo", "character_type": "robot"}}"#;
        let structure = parse_structure(text).unwrap();
        assert_eq!(structure.main_character.character_type, CharacterType::NonHuman);
    }

    #[test]
    fn test_parse_structure_malformed() {
        let err = parse_structure("{not json}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
        let err = parse_structure("plain prose").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_parse_pages_from_labels() {
        let text = "Page 1: One.\nPage 2: Two.\npage 3： Three.";
        let pages = parse_pages(text, 3).unwrap();
        assert_eq!(pages, vec!["One.", "Two.", "Three."]);
    }

    #[test]
    fn test_parse_pages_falls_back_to_paragraphs() {
        let text = "First paragraph.\n\nSecond paragraph.\n\n\nThird.";
        let pages = parse_pages(text, 10).unwrap();
        assert_eq!(pages, vec!["First paragraph.", "Second paragraph.", "Third."]);
    }

    #[test]
    fn test_parse_pages_truncates() {
        let text = (1..=12)
            .map(|i| format!("Page {i}: text {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let pages = parse_pages(&text, 10).unwrap();
        assert_eq!(pages.len(), 10);
        assert_eq!(pages[9], "text 10");
    }

    #[test]
    fn test_parse_pages_empty_is_malformed() {
        let err = parse_pages("   \n\n  ", 10).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_parse_analysis() {
        let text = r#"Sure! {"theme": "sharing", "character": "Fox", "setting": "forest",
            "character_desc": "a red fox", "scene_desc": "autumn woods"}"#;
        let request = parse_analysis(text).unwrap();
        assert_eq!(request.theme, "sharing");
        assert_eq!(request.main_character, "Fox");
        assert_eq!(request.scene_desc.as_deref(), Some("autumn woods"));
    }

    #[test]
    fn test_parse_analysis_missing_field() {
        let err = parse_analysis(r#"{"theme": "x"}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_apply_request_defaults() {
        let mut structure = StoryStructure::default();
        let request = StoryRequest::new("courage", "Mia", "lighthouse").with_scene_desc("stormy coast");
        structure.apply_request_defaults(&request);
        assert_eq!(structure.main_character.name, "Mia");
        assert_eq!(structure.setting.name, "lighthouse");
        assert_eq!(structure.setting.description, "stormy coast");
    }
}
