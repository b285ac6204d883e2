//! Identity directory for the users service.
//!
//! User records are stored as JSON under `users/<id>`. Personally
//! identifying fields (name, email) are sealed with the [`FieldCipher`]
//! before they reach storage, and the email additionally gets a blind index
//! stored under `users-by-email/<index>` so login can find a user without
//! decrypting anything. Passwords are kept only as salted hashes: Argon2id
//! for anything written here, bcrypt for records carried over from the
//! older users service.
//!
//! Argon2 is deliberately slow, so hashing and verification run on the
//! blocking thread pool.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use trustgate_core::error::{CipherError, PasswordError};
use trustgate_core::{BlindIndexer, FieldCipher, PasswordVerifier};
use trustgate_storage::{StorageBackend, StorageError};

/// Storage prefix for user records.
const USER_PREFIX: &str = "users/";

/// Storage prefix for the email blind index.
const EMAIL_INDEX_PREFIX: &str = "users-by-email/";

/// Errors from directory operations.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// No user with this id.
    #[error("user not found: {id}")]
    NotFound { id: String },

    /// Another user already registered this email.
    #[error("the given email is already in use")]
    EmailTaken,

    /// Input failed validation.
    #[error("invalid user data: {reason}")]
    Invalid { reason: String },

    /// A stored record could not be decoded.
    #[error("corrupt user record: {reason}")]
    Corrupt { reason: String },

    /// Password hashing or verification failed.
    #[error("directory password error: {0}")]
    Password(#[from] PasswordError),

    /// Field encryption or decryption failed.
    #[error("directory cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// The storage backend failed.
    #[error("directory storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Account tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    Anonymous,
    #[default]
    Free,
    Premium,
}

/// A user record as persisted. Sensitive fields hold envelopes, not
/// plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub email_index: Option<String>,
    pub password_hash: Option<String>,
    pub tier: UserTier,
    pub created_at: DateTime<Utc>,
}

/// Decrypted view of a user, safe to return to the account owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub tier: UserTier,
    pub created_at: DateTime<Utc>,
}

/// Input for [`UserDirectory::register`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub tier: UserTier,
}

/// Input for [`UserDirectory::update_profile`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub tier: Option<UserTier>,
    pub password: Option<String>,
}

/// User storage with encrypted PII and blind-indexed email lookup.
#[derive(Clone)]
pub struct UserDirectory {
    storage: Arc<dyn StorageBackend>,
    cipher: FieldCipher,
    indexer: BlindIndexer,
    passwords: PasswordVerifier,
}

impl std::fmt::Debug for UserDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDirectory").finish_non_exhaustive()
    }
}

impl UserDirectory {
    /// Create a directory over `storage`.
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        cipher: FieldCipher,
        indexer: BlindIndexer,
        passwords: PasswordVerifier,
    ) -> Self {
        Self {
            storage,
            cipher,
            indexer,
            passwords,
        }
    }

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::EmailTaken`] if the email is already
    /// registered, [`DirectoryError::Invalid`] for bad input, and the
    /// underlying error if hashing, encryption or storage fails.
    pub async fn register(&self, new_user: NewUser) -> Result<UserRecord, DirectoryError> {
        let email = non_blank(new_user.email.as_deref());
        if let Some(email) = email {
            validate_email(email)?;
        }

        let password_hash = match non_blank(new_user.password.as_deref()) {
            Some(password) => Some(self.hash_password(password.to_owned()).await?),
            None => None,
        };

        let name = self.seal(new_user.name.as_deref())?;
        let sealed_email = self.seal(email)?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let email_index = self.indexer.index(email);
        if let Some(ref index) = email_index {
            self.claim_email(index, &id).await?;
        }

        let record = UserRecord {
            name,
            email: sealed_email,
            email_index: email_index.clone(),
            password_hash,
            tier: new_user.tier,
            created_at: Utc::now(),
            id,
        };

        if let Err(e) = self.write(&record).await {
            if let Some(index) = email_index {
                self.release_email(&index).await;
            }
            return Err(e);
        }

        info!(user_id = %record.id, tier = ?record.tier, "user registered");
        Ok(record)
    }

    /// Fetch a user by id.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NotFound`] if no such user exists.
    pub async fn get(&self, id: &str) -> Result<UserRecord, DirectoryError> {
        let bytes = self
            .storage
            .get(&user_key(id))
            .await?
            .ok_or_else(|| DirectoryError::NotFound { id: id.to_owned() })?;
        serde_json::from_slice(&bytes).map_err(|e| DirectoryError::Corrupt {
            reason: e.to_string(),
        })
    }

    /// Find a user by email through the blind index.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or the record is corrupt.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError> {
        let Some(index) = self.indexer.index(Some(email)) else {
            return Ok(None);
        };
        let Some(id) = self.storage.get(&email_key(&index)).await? else {
            return Ok(None);
        };
        let id = String::from_utf8(id).map_err(|e| DirectoryError::Corrupt {
            reason: e.to_string(),
        })?;

        match self.get(&id).await {
            Ok(record) => Ok(Some(record)),
            Err(DirectoryError::NotFound { .. }) => {
                warn!(user_id = %id, "email index points at a missing user");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Check an email/password pair.
    ///
    /// Returns `Ok(None)` for an unknown email, a user without a password,
    /// or a wrong password, so callers cannot tell these apart.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or the stored hash is corrupt.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, DirectoryError> {
        let Some(record) = self.find_by_email(email).await? else {
            return Ok(None);
        };
        let Some(stored) = record.password_hash.clone() else {
            return Ok(None);
        };

        let verifier = self.passwords.clone();
        let submitted = password.to_owned();
        let matches = tokio::task::spawn_blocking(move || verifier.verify(&submitted, &stored))
            .await
            .map_err(|e| PasswordError::Hashing {
                reason: format!("verification task failed: {e}"),
            })??;

        Ok(matches.then_some(record))
    }

    /// Apply `update` as a single write. Changed sensitive fields get fresh
    /// envelopes, a new password is rehashed and a changed email moves its
    /// blind index entry.
    ///
    /// Everything that can fail on input is checked before storage is
    /// touched, so a rejected update leaves the record unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NotFound`] for an unknown user,
    /// [`DirectoryError::Invalid`] for a bad email or an empty password and
    /// [`DirectoryError::EmailTaken`] if the new email belongs to someone
    /// else.
    pub async fn update_profile(
        &self,
        id: &str,
        update: ProfileUpdate,
    ) -> Result<UserRecord, DirectoryError> {
        let email = non_blank(update.email.as_deref());
        if let Some(email) = email {
            validate_email(email)?;
        }
        let password = match update.password.as_deref() {
            Some(password) => Some(non_blank(Some(password)).ok_or_else(|| {
                DirectoryError::Invalid {
                    reason: "password must not be empty".to_owned(),
                }
            })?),
            None => None,
        };

        let mut record = self.get(id).await?;

        if let Some(name) = non_blank(update.name.as_deref()) {
            record.name = self.seal(Some(name))?;
        }
        if let Some(tier) = update.tier {
            record.tier = tier;
        }
        if let Some(password) = password {
            record.password_hash = Some(self.hash_password(password.to_owned()).await?);
        }

        let mut claimed = None;
        let mut released = None;
        if let Some(email) = email {
            record.email = self.seal(Some(email))?;
            let new_index = self.indexer.index(Some(email));
            if new_index != record.email_index {
                if let Some(ref index) = new_index {
                    self.claim_email(index, id).await?;
                    claimed.clone_from(&new_index);
                }
                released = record.email_index.take();
                record.email_index = new_index;
            }
        }

        if let Err(e) = self.write(&record).await {
            if let Some(index) = claimed {
                self.release_email(&index).await;
            }
            return Err(e);
        }
        if let Some(old) = released {
            self.release_email(&old).await;
        }

        info!(user_id = %id, password_changed = password.is_some(), "user profile updated");
        Ok(record)
    }

    /// Delete a user and its email index entry.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NotFound`] for an unknown user.
    pub async fn delete(&self, id: &str) -> Result<(), DirectoryError> {
        let record = self.get(id).await?;
        self.storage.delete(&user_key(id)).await?;
        if let Some(index) = record.email_index {
            self.release_email(&index).await;
        }
        info!(user_id = %id, "user deleted");
        Ok(())
    }

    /// Decrypt a record into the profile returned to its owner.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Cipher`] if an envelope is malformed or
    /// fails authentication.
    pub fn reveal(&self, record: &UserRecord) -> Result<UserProfile, DirectoryError> {
        Ok(UserProfile {
            id: record.id.clone(),
            name: self.cipher.decrypt(record.name.as_deref())?,
            email: self.cipher.decrypt(record.email.as_deref())?,
            tier: record.tier,
            created_at: record.created_at,
        })
    }

    fn seal(&self, value: Option<&str>) -> Result<Option<String>, DirectoryError> {
        match value {
            Some(value) => Ok(self.cipher.encrypt(value)?),
            None => Ok(None),
        }
    }

    async fn hash_password(&self, password: String) -> Result<String, DirectoryError> {
        let hasher = self.passwords.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| PasswordError::Hashing {
                reason: format!("hashing task failed: {e}"),
            })??;
        Ok(hash)
    }

    async fn claim_email(&self, index: &str, id: &str) -> Result<(), DirectoryError> {
        if self
            .storage
            .put_if_absent(&email_key(index), id.as_bytes())
            .await?
        {
            Ok(())
        } else {
            Err(DirectoryError::EmailTaken)
        }
    }

    async fn release_email(&self, index: &str) {
        if let Err(e) = self.storage.delete(&email_key(index)).await {
            warn!(error = %e, "failed to release email index entry");
        }
    }

    async fn write(&self, record: &UserRecord) -> Result<(), DirectoryError> {
        let bytes = serde_json::to_vec(record).map_err(|e| DirectoryError::Corrupt {
            reason: format!("record serialization failed: {e}"),
        })?;
        self.storage.put(&user_key(&record.id), &bytes).await?;
        Ok(())
    }
}

fn user_key(id: &str) -> String {
    format!("{USER_PREFIX}{id}")
}

fn email_key(index: &str) -> String {
    format!("{EMAIL_INDEX_PREFIX}{index}")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn validate_email(email: &str) -> Result<(), DirectoryError> {
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(DirectoryError::Invalid {
            reason: "email must look like user@domain".to_owned(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use trustgate_storage::MemoryBackend;

    use super::*;

    /// In-memory storage whose user record writes fail while
    /// `fail_writes` is set. Index claims still succeed.
    #[derive(Clone, Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        fail_writes: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl StorageBackend for FlakyBackend {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) && key.starts_with(USER_PREFIX) {
                return Err(StorageError {
                    key: key.to_owned(),
                    reason: "disk full".to_owned(),
                });
            }
            self.inner.put(key, value).await
        }

        async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
            self.inner.put_if_absent(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.inner.delete(key).await
        }
    }

    fn flaky_directory() -> (UserDirectory, FlakyBackend) {
        let backend = FlakyBackend::default();
        let directory = UserDirectory::new(
            Arc::new(backend.clone()),
            FieldCipher::from_secret(Some("directory-test-master")).unwrap(),
            BlindIndexer::new(),
            PasswordVerifier::new(),
        );
        (directory, backend)
    }

    fn directory() -> (UserDirectory, MemoryBackend) {
        let storage = MemoryBackend::new();
        let cipher = FieldCipher::from_secret(Some("directory-test-master")).unwrap();
        let directory = UserDirectory::new(
            Arc::new(storage.clone()),
            cipher,
            BlindIndexer::new(),
            PasswordVerifier::new(),
        );
        (directory, storage)
    }

    fn alice() -> NewUser {
        NewUser {
            name: Some("Alice".to_owned()),
            email: Some("Alice@Example.com".to_owned()),
            password: Some("wonderland".to_owned()),
            tier: UserTier::Free,
        }
    }

    #[tokio::test]
    async fn register_stores_no_plaintext_pii() {
        let (directory, storage) = directory();
        let record = directory.register(alice()).await.unwrap();

        let raw = storage.get(&user_key(&record.id)).await.unwrap().unwrap();
        let raw = String::from_utf8(raw).unwrap();
        assert!(!raw.contains("Alice"));
        assert!(!raw.to_lowercase().contains("alice@example.com"));
        assert!(!raw.contains("wonderland"));

        let profile = directory.reveal(&record).unwrap();
        assert_eq!(profile.name.as_deref(), Some("Alice"));
        assert_eq!(profile.email.as_deref(), Some("Alice@Example.com"));
    }

    #[tokio::test]
    async fn find_by_email_normalizes() {
        let (directory, _) = directory();
        let record = directory.register(alice()).await.unwrap();
        let found = directory
            .find_by_email("  alice@example.COM ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, record.id);
        assert!(directory.find_by_email("bob@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let (directory, _) = directory();
        directory.register(alice()).await.unwrap();
        let mut again = alice();
        again.email = Some("alice@example.com ".to_owned());
        assert!(matches!(
            directory.register(again).await,
            Err(DirectoryError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn authenticate_checks_password() {
        let (directory, _) = directory();
        let record = directory.register(alice()).await.unwrap();

        let ok = directory
            .authenticate("alice@example.com", "wonderland")
            .await
            .unwrap();
        assert_eq!(ok.map(|r| r.id), Some(record.id));
        assert!(directory
            .authenticate("alice@example.com", "looking-glass")
            .await
            .unwrap()
            .is_none());
        assert!(directory
            .authenticate("nobody@example.com", "wonderland")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn anonymous_user_needs_no_email_or_password() {
        let (directory, _) = directory();
        let record = directory
            .register(NewUser {
                tier: UserTier::Anonymous,
                ..NewUser::default()
            })
            .await
            .unwrap();
        assert!(record.email.is_none());
        assert!(record.email_index.is_none());
        let profile = directory.reveal(&record).unwrap();
        assert_eq!(profile.email, None);
        assert_eq!(profile.tier, UserTier::Anonymous);
    }

    #[tokio::test]
    async fn update_email_moves_index() {
        let (directory, _) = directory();
        let record = directory.register(alice()).await.unwrap();
        let old_envelope = record.email.clone();

        let updated = directory
            .update_profile(
                &record.id,
                ProfileUpdate {
                    email: Some("alice@wonderland.org".to_owned()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_ne!(updated.email, old_envelope);
        assert!(directory.find_by_email("alice@example.com").await.unwrap().is_none());
        assert_eq!(
            directory
                .find_by_email("alice@wonderland.org")
                .await
                .unwrap()
                .map(|r| r.id),
            Some(record.id)
        );
    }

    #[tokio::test]
    async fn update_to_taken_email_is_rejected() {
        let (directory, _) = directory();
        directory.register(alice()).await.unwrap();
        let bob = directory
            .register(NewUser {
                email: Some("bob@example.com".to_owned()),
                ..alice()
            })
            .await
            .unwrap();
        let result = directory
            .update_profile(
                &bob.id,
                ProfileUpdate {
                    email: Some("ALICE@example.com".to_owned()),
                    ..ProfileUpdate::default()
                },
            )
            .await;
        assert!(matches!(result, Err(DirectoryError::EmailTaken)));
    }

    #[tokio::test]
    async fn update_replaces_password() {
        let (directory, _) = directory();
        let record = directory.register(alice()).await.unwrap();
        directory
            .update_profile(
                &record.id,
                ProfileUpdate {
                    password: Some("new-pass".to_owned()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(directory
            .authenticate("alice@example.com", "wonderland")
            .await
            .unwrap()
            .is_none());
        assert!(directory
            .authenticate("alice@example.com", "new-pass")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn rejected_update_changes_nothing() {
        let (directory, _) = directory();
        let record = directory.register(alice()).await.unwrap();

        let result = directory
            .update_profile(
                &record.id,
                ProfileUpdate {
                    email: Some("new@example.com".to_owned()),
                    password: Some(String::new()),
                    ..ProfileUpdate::default()
                },
            )
            .await;
        assert!(matches!(result, Err(DirectoryError::Invalid { .. })));

        let stored = directory.get(&record.id).await.unwrap();
        assert_eq!(
            directory.reveal(&stored).unwrap().email.as_deref(),
            Some("Alice@Example.com")
        );
        assert!(directory.find_by_email("new@example.com").await.unwrap().is_none());
        assert!(directory
            .authenticate("alice@example.com", "wonderland")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn failed_write_releases_new_email_claim() {
        let (directory, backend) = flaky_directory();
        let record = directory.register(alice()).await.unwrap();

        backend.fail_writes.store(true, Ordering::SeqCst);
        let result = directory
            .update_profile(
                &record.id,
                ProfileUpdate {
                    email: Some("moved@example.com".to_owned()),
                    ..ProfileUpdate::default()
                },
            )
            .await;
        assert!(matches!(result, Err(DirectoryError::Storage(_))));
        backend.fail_writes.store(false, Ordering::SeqCst);

        assert!(directory.find_by_email("moved@example.com").await.unwrap().is_none());
        assert_eq!(
            directory
                .find_by_email("alice@example.com")
                .await
                .unwrap()
                .map(|r| r.id),
            Some(record.id)
        );
        directory
            .register(NewUser {
                email: Some("moved@example.com".to_owned()),
                ..alice()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_register_releases_email_claim() {
        let (directory, backend) = flaky_directory();
        backend.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(
            directory.register(alice()).await,
            Err(DirectoryError::Storage(_))
        ));
        backend.fail_writes.store(false, Ordering::SeqCst);
        directory.register(alice()).await.unwrap();
    }

    #[tokio::test]
    async fn delete_frees_email() {
        let (directory, _) = directory();
        let record = directory.register(alice()).await.unwrap();
        directory.delete(&record.id).await.unwrap();
        assert!(matches!(
            directory.get(&record.id).await,
            Err(DirectoryError::NotFound { .. })
        ));
        directory.register(alice()).await.unwrap();
    }

    #[tokio::test]
    async fn tampered_envelope_fails_reveal() {
        let (directory, _) = directory();
        let mut record = directory.register(alice()).await.unwrap();
        let envelope = record.email.take().unwrap();
        let (head, ciphertext) = envelope.rsplit_once(':').unwrap();
        let swapped = if ciphertext.starts_with('A') { "B" } else { "A" };
        record.email = Some(format!("{head}:{swapped}{}", &ciphertext[1..]));

        assert!(matches!(
            directory.reveal(&record),
            Err(DirectoryError::Cipher(CipherError::AuthenticationFailed))
        ));
    }

    #[tokio::test]
    async fn invalid_email_is_rejected() {
        let (directory, _) = directory();
        let result = directory
            .register(NewUser {
                email: Some("not-an-email".to_owned()),
                ..alice()
            })
            .await;
        assert!(matches!(result, Err(DirectoryError::Invalid { .. })));
    }
}
