//! Hashing for change detection.
//!
//! Hashes are computed over the canonical JSON form of a value, so two
//! payloads hash equal exactly when they would be sent identically.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::spec::BowtieConfig;

/// Hasher for configurations and entity payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the entire declared configuration.
    #[must_use]
    pub fn hash_config(&self, config: &BowtieConfig) -> String {
        self.hash_payload(config)
    }

    /// Computes a hash of any serializable payload.
    #[must_use]
    pub fn hash_payload<T: Serialize + ?Sized>(&self, payload: &T) -> String {
        let bytes = serde_json::to_vec(payload).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Returns the first 12 characters of a hash for display.
    #[must_use]
    pub fn short_hash(hash: &str) -> &str {
        hash.get(..12).unwrap_or(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::GroupPayload;

    fn group(name: &str) -> GroupPayload {
        GroupPayload {
            id: String::from("g-1"),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_hash_deterministic() {
        let hasher = ConfigHasher::new();
        assert_eq!(hasher.hash_payload(&group("eng")), hasher.hash_payload(&group("eng")));
        assert_eq!(hasher.hash_payload(&group("eng")).len(), 64);
    }

    #[test]
    fn test_hash_changes_with_content() {
        let hasher = ConfigHasher::new();
        assert_ne!(hasher.hash_payload(&group("eng")), hasher.hash_payload(&group("ops")));
    }

    #[test]
    fn test_config_hash() {
        let hasher = ConfigHasher::new();
        let mut config = BowtieConfig::default();
        let empty = hasher.hash_config(&config);
        config.host = Some(String::from("https://bowtie.example.com"));
        assert_ne!(empty, hasher.hash_config(&config));
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(ConfigHasher::short_hash("abcdef0123456789"), "abcdef012345");
        assert_eq!(ConfigHasher::short_hash("abc"), "abc");
    }
}
