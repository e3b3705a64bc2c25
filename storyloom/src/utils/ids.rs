//! Identifier generation.

use uuid::Uuid;

/// Generates a new UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Generates an artifact id: `story_` followed by a simple-form UUID v4.
#[must_use]
pub fn generate_artifact_id() -> String {
    format!("story_{}", generate_uuid().simple())
}
