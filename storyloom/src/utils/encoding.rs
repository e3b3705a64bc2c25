//! Byte payload encoding: base64 for serde, SHA-256 digests for summaries.

use sha2::{Digest, Sha256};

/// Returns the hex SHA-256 digest of `bytes`, truncated to 16 characters.
#[must_use]
pub fn payload_digest(bytes: &[u8]) -> String {
    let mut digest = hex::encode(Sha256::digest(bytes));
    digest.truncate(16);
    digest
}

/// Serde adapter storing `Vec<u8>` as a standard base64 string.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes bytes as base64.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Deserializes bytes from base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    }

    #[test]
    fn test_base64_bytes() {
        let blob = Blob { data: b"hello".to_vec() };
        let json = serde_json::to_value(&blob).unwrap();
        assert_eq!(json["data"], "aGVsbG8=");
        let back: Blob = serde_json::from_value(json).unwrap();
        assert_eq!(back, blob);
    }

    #[test]
    fn test_base64_rejects_garbage() {
        let err = serde_json::from_str::<Blob>(r#"{"data": "***"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_payload_digest_stable() {
        assert_eq!(payload_digest(b""), "e3b0c44298fc1c14");
        assert_eq!(payload_digest(b"abc").len(), 16);
    }
}
