//! Shared application state for the `Trustgate` server.
//!
//! A single [`AppState`] is built at startup and shared across all Axum
//! handlers via `Arc`. Everything in it is either immutable key material or
//! internally synchronized, so handlers never take a lock on the state
//! itself.

use std::sync::Arc;

use trustgate_core::{
    AuthorizationGate, BlindIndexer, FieldCipher, PasswordVerifier, SessionTokenCodec,
};
use trustgate_storage::StorageBackend;

use crate::config::ServerConfig;
use crate::directory::UserDirectory;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Issues session tokens on login.
    pub codec: SessionTokenCodec,
    /// Authorization decision for every gated route.
    pub gate: AuthorizationGate,
    /// User records with encrypted PII.
    pub directory: UserDirectory,
}

impl AppState {
    /// Build the state from configuration over the given storage backend.
    #[must_use]
    pub fn new(config: &ServerConfig, storage: Arc<dyn StorageBackend>) -> Self {
        let codec = SessionTokenCodec::new(config.signing_secret.clone());
        let gate =
            AuthorizationGate::new(codec.clone()).with_share_links(config.allow_share_links);
        let directory = UserDirectory::new(
            storage,
            FieldCipher::new(&config.master_secret),
            BlindIndexer::new(),
            PasswordVerifier::new(),
        );

        Self {
            codec,
            gate,
            directory,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
