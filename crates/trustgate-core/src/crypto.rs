//! Cryptographic primitives for field encryption.
//!
//! Provides AES-256-GCM authenticated encryption with detached tags and the
//! SHA-256 master-key derivation. Key material is zeroized on drop.
//!
//! # Security model
//!
//! - Every encryption generates a fresh 96-bit nonce via `OsRng`.
//! - Output is split into `nonce (12 bytes)`, `tag (16 bytes)` and the
//!   ciphertext so the envelope layer can serialize each part separately.
//! - The field key is `SHA-256(master secret)`. There is no salt and no
//!   rotation: one static key for the lifetime of the secret.

use std::fmt;

use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CipherError;
use crate::secret::MasterSecret;

/// Nonce length for AES-256-GCM (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length for AES-256-GCM (128 bits).
pub const TAG_LEN: usize = 16;

/// A 256-bit encryption key that is zeroized on drop.
///
/// The inner bytes are never exposed in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Derive the field key by hashing the master secret with SHA-256.
    #[must_use]
    pub fn derive(master: &MasterSecret) -> Self {
        let digest = Sha256::digest(master.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    ///
    /// The caller must not log or persist these bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The three parts of an AES-256-GCM encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

/// Encrypt plaintext using AES-256-GCM with a fresh random nonce.
///
/// # Errors
///
/// Returns [`CipherError::Encryption`] if the AEAD operation fails.
pub fn seal(key: &EncryptionKey, plaintext: &[u8]) -> Result<Sealed, CipherError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(&nonce, b"", &mut buffer)
        .map_err(|e| CipherError::Encryption {
            reason: e.to_string(),
        })?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&nonce);
    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(Sealed {
        nonce: nonce_bytes,
        tag: tag_bytes,
        ciphertext: buffer,
    })
}

/// Decrypt and authenticate the output of [`seal`].
///
/// The plaintext is only returned after the tag has verified.
///
/// # Errors
///
/// Returns [`CipherError::AuthenticationFailed`] if the tag does not verify
/// (wrong key, corrupted ciphertext, or tampered tag).
pub fn open(key: &EncryptionKey, sealed: &Sealed) -> Result<Vec<u8>, CipherError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Nonce::from_slice(&sealed.nonce);
    let tag = Tag::from_slice(&sealed.tag);
    let mut buffer = sealed.ciphertext.clone();

    cipher
        .decrypt_in_place_detached(nonce, b"", &mut buffer, tag)
        .map_err(|_| {
            buffer.zeroize();
            CipherError::AuthenticationFailed
        })?;
    Ok(buffer)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn key() -> EncryptionKey {
        EncryptionKey::derive(&MasterSecret::new("unit-test-master").unwrap())
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = key();
        let sealed = seal(&key, b"alice@example.com").unwrap();
        let opened = open(&key, &sealed).unwrap();
        assert_eq!(opened, b"alice@example.com");
    }

    #[test]
    fn seal_open_empty_plaintext() {
        let key = key();
        let sealed = seal(&key, b"").unwrap();
        assert!(sealed.ciphertext.is_empty());
        assert!(open(&key, &sealed).unwrap().is_empty());
    }

    #[test]
    fn ciphertext_length_matches_plaintext() {
        let sealed = seal(&key(), b"data").unwrap();
        assert_eq!(sealed.ciphertext.len(), 4);
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let other = EncryptionKey::derive(&MasterSecret::new("other").unwrap());
        let sealed = seal(&key(), b"secret").unwrap();
        assert!(matches!(
            open(&other, &sealed),
            Err(CipherError::AuthenticationFailed)
        ));
    }

    #[test]
    fn two_seals_use_different_nonces() {
        let key = key();
        let a = seal(&key, b"same data").unwrap();
        let b = seal(&key, b"same data").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn derive_is_deterministic() {
        let master = MasterSecret::new("stable").unwrap();
        let k1 = EncryptionKey::derive(&master);
        let k2 = EncryptionKey::derive(&master);
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn derive_is_plain_sha256_of_master() {
        let master = MasterSecret::new("abc").unwrap();
        let key = EncryptionKey::derive(&master);
        assert_eq!(
            hex::encode(key.as_bytes()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn encryption_key_debug_redacts_bytes() {
        let debug = format!("{:?}", key());
        assert!(debug.contains("[REDACTED]"));
    }
}
