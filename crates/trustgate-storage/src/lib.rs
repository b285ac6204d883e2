//! Storage backend abstraction for `Trustgate`.
//!
//! This crate defines the [`StorageBackend`] trait, a plain key-value
//! interface that knows nothing about users, tokens, or encryption. The
//! identity directory in `trustgate-server` stores records whose sensitive
//! fields are already sealed by the field cipher before they reach this
//! layer.
//!
//! [`MemoryBackend`] is the only implementation shipped here.

mod error;
mod memory;

pub use error::StorageError;
pub use memory::MemoryBackend;

/// A pluggable key-value storage backend.
///
/// Keys are UTF-8 strings using `/` as a separator (e.g. `users/<id>`,
/// `users-by-email/<index>`). Values are opaque byte arrays.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a key-value pair, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the underlying backend fails.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Store a key-value pair only if the key is not present yet.
    ///
    /// Returns `Ok(true)` if the value was written and `Ok(false)` if the key
    /// was already taken. The check and the write are atomic, which is what
    /// unique secondary indexes rely on.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the underlying backend fails.
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StorageError>;

    /// Delete a key. Deleting a non-existent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the underlying backend fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
