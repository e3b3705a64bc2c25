//! Core types: tasks, batch outcomes, the artifact, and run states.

mod artifact;
mod outcome;
mod status;
pub mod story;
mod task;

pub use artifact::{
    Artifact, CoverArtifact, GenerationStats, PageArtifact, RegenerationTarget,
};
pub use outcome::BatchOutcome;
pub use status::{RunStage, TaskVariant};
pub use story::{CharacterProfile, CharacterType, SettingProfile, StoryRequest, StoryStructure};
pub use task::{page_key, TaskDescriptor, TaskResult, COVER_KEY};
