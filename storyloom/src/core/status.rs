//! Run lifecycle states and task variants.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of one top-level generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    /// No run has started.
    #[default]
    Idle,
    /// Generating the story structure (primary call).
    StructureGenerating,
    /// Generating the page texts (primary call).
    PagesGenerating,
    /// Running the image prompt batch.
    PromptsGenerating,
    /// Running the image and audio batches concurrently.
    MediaGenerating,
    /// Merging batch outcomes into the artifact.
    Assembling,
    /// The run produced an artifact.
    Complete,
    /// A primary stage failed; no artifact was produced.
    Failed,
}

impl RunStage {
    /// Returns true if the run is no longer in progress.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Idle | Self::Complete | Self::Failed)
    }

    /// Returns true if moving to `next` is a legal step.
    ///
    /// A new run may start from any terminal state, and any in-progress
    /// state may fail.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (from, Self::StructureGenerating) => from.is_terminal(),
            (Self::StructureGenerating, Self::PagesGenerating)
            | (Self::PagesGenerating, Self::PromptsGenerating)
            | (Self::PromptsGenerating, Self::MediaGenerating)
            | (Self::MediaGenerating, Self::Assembling)
            | (Self::Assembling, Self::Complete) => true,
            (from, Self::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::StructureGenerating => write!(f, "structure_generating"),
            Self::PagesGenerating => write!(f, "pages_generating"),
            Self::PromptsGenerating => write!(f, "prompts_generating"),
            Self::MediaGenerating => write!(f, "media_generating"),
            Self::Assembling => write!(f, "assembling"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Whether a unit of work belongs to the cover or to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskVariant {
    /// The book cover (ordinal 0).
    Cover,
    /// A numbered page (ordinal >= 1).
    Page,
}

impl fmt::Display for TaskVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cover => write!(f, "cover"),
            Self::Page => write!(f, "page"),
        }
    }
}
