//! Storage error types.

/// The backend could not complete an operation on `key`.
#[derive(Debug, thiserror::Error)]
#[error("storage backend failed on key '{key}': {reason}")]
pub struct StorageError {
    pub key: String,
    pub reason: String,
}
