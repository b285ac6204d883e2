//! Password hashing and verification.
//!
//! New credentials are Argon2id PHC strings
//! (`$argon2id$v=19$m=...,t=...,p=...$<salt>$<hash>`). Records written by
//! the older users service hold bcrypt hashes (`$2a$`, `$2b$`, `$2y$`) and
//! still verify, so existing accounts keep working. Either way the hash is
//! recomputed with the stored parameters and compared in constant time.
//!
//! A wrong password is a normal `Ok(false)`. Only a stored hash that cannot
//! be parsed is an error.

use argon2::{Argon2, PasswordHasher, PasswordVerifier as _};
use password_hash::{PasswordHash, SaltString};

use crate::error::PasswordError;

/// Salt length in bytes for newly hashed passwords.
const SALT_LEN: usize = 16;

/// Modular-crypt prefixes of bcrypt hashes.
const BCRYPT_PREFIXES: [&str; 3] = ["$2a$", "$2b$", "$2y$"];

/// Verifies submitted passwords against stored salted hashes.
#[derive(Clone, Default)]
pub struct PasswordVerifier {
    argon2: Argon2<'static>,
}

impl std::fmt::Debug for PasswordVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordVerifier").finish_non_exhaustive()
    }
}

impl PasswordVerifier {
    /// Create a verifier using the default Argon2id cost parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `submitted` against `stored_hash`.
    ///
    /// # Errors
    ///
    /// Returns [`PasswordError::CorruptCredential`] if `stored_hash` is
    /// neither a valid bcrypt hash nor a valid PHC string, or names an
    /// unsupported algorithm.
    pub fn verify(&self, submitted: &str, stored_hash: &str) -> Result<bool, PasswordError> {
        if BCRYPT_PREFIXES.iter().any(|p| stored_hash.starts_with(p)) {
            return bcrypt::verify(submitted, stored_hash).map_err(|e| {
                PasswordError::CorruptCredential {
                    reason: e.to_string(),
                }
            });
        }

        let parsed =
            PasswordHash::new(stored_hash).map_err(|e| PasswordError::CorruptCredential {
                reason: e.to_string(),
            })?;

        match self.argon2.verify_password(submitted.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::CorruptCredential {
                reason: e.to_string(),
            }),
        }
    }

    /// Hash a new password with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns [`PasswordError::Hashing`] if salt generation or hashing
    /// fails.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let mut salt_bytes = [0u8; SALT_LEN];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| PasswordError::Hashing {
            reason: e.to_string(),
        })?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| PasswordError::Hashing {
            reason: e.to_string(),
        })?;

        let phc = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hashing {
                reason: e.to_string(),
            })?;
        Ok(phc.to_string())
    }
}
