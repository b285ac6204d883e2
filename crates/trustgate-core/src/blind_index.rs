//! Deterministic blind index for equality lookups over encrypted fields.
//!
//! `index(v) = hex(SHA-256(lowercase(trim(v))))`. The index is stored next to
//! the field envelope and used only as a secondary lookup key; it cannot be
//! reversed to recover the value.

use sha2::{Digest, Sha256};

/// Computes blind index values for searchable sensitive fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlindIndexer;

impl BlindIndexer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Index `value`, returning `None` when it is absent or blank.
    #[must_use]
    pub fn index(&self, value: Option<&str>) -> Option<String> {
        let normalized = normalize(value?);
        if normalized.is_empty() {
            return None;
        }
        Some(hex::encode(Sha256::digest(normalized.as_bytes())))
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}
