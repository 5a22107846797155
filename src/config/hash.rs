//! Stack file hashing for change detection.
//!
//! Hashes are computed over the canonical JSON form of the declared stack
//! (object keys sorted), so formatting and key order in the YAML do not
//! matter. Connection settings are excluded: pointing the same stack at
//! another Data Plane endpoint does not change its hash.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::spec::StackConfig;

/// Hasher for computing stack hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new stack hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the declared stack and its reconcile options.
    #[must_use]
    pub fn hash_config(&self, config: &StackConfig) -> String {
        let mut hasher = Sha256::new();
        hasher.update(canonical(&config.stack));
        hasher.update(canonical(&config.reconcile));
        hex::encode(hasher.finalize())
    }

    /// Computes a hash of a single section (a backend, a frontend, a block).
    #[must_use]
    pub fn hash_section<T: Serialize>(&self, section: &T) -> String {
        hex::encode(Sha256::digest(canonical(section)))
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Serializes through `serde_json::Value`, whose maps keep keys sorted.
fn canonical<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_value(value)
        .and_then(|v| serde_json::to_vec(&v))
        .unwrap_or_default()
}
