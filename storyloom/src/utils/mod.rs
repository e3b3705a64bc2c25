//! Utility functions for ids, timestamps and byte payloads.

mod encoding;
mod ids;
pub mod timestamps;

pub use encoding::{base64_bytes, payload_digest};
pub use ids::{generate_artifact_id, generate_uuid};
pub use timestamps::{format_timestamp, iso_timestamp, Timestamp};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_is_valid() {
        let id = generate_uuid();
        assert_eq!(id.get_version_num(), 4);
    }

    #[test]
    fn test_artifact_id_shape() {
        let id = generate_artifact_id();
        assert!(id.starts_with("story_"));
        assert_eq!(id.len(), "story_".len() + 32);
        assert_ne!(id, generate_artifact_id());
    }

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.contains(':'));
    }
}
