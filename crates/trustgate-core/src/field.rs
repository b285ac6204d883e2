//! Authenticated encryption of individual sensitive fields.
//!
//! A field value is stored as an envelope string
//! `base64(nonce):base64(tag):base64(ciphertext)` using standard padded
//! base64. Envelopes are replaced whole on update, never patched.
//!
//! Empty input is passed through as an absent envelope, and an absent
//! envelope decrypts to an absent value. Anything else either decrypts and
//! authenticates completely or fails; there is no path that returns
//! unverified or truncated plaintext.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::crypto::{self, EncryptionKey, NONCE_LEN, Sealed, TAG_LEN};
use crate::error::{CipherError, ConfigError};
use crate::secret::MasterSecret;

/// Separator between the three envelope parts.
const SEPARATOR: char = ':';

/// A parsed field envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope(Sealed);

impl Envelope {
    /// Ciphertext bytes.
    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.0.ciphertext
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            STANDARD.encode(self.0.nonce),
            STANDARD.encode(self.0.tag),
            STANDARD.encode(&self.0.ciphertext)
        )
    }
}

impl FromStr for Envelope {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(SEPARATOR);
        let (Some(nonce_b64), Some(tag_b64), Some(ciphertext_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CipherError::MalformedEnvelope {
                reason: "expected nonce:tag:ciphertext".to_owned(),
            });
        };

        let nonce = decode_fixed::<NONCE_LEN>(nonce_b64, "nonce")?;
        let tag = decode_fixed::<TAG_LEN>(tag_b64, "tag")?;
        let ciphertext = decode(ciphertext_b64, "ciphertext")?;

        Ok(Self(Sealed {
            nonce,
            tag,
            ciphertext,
        }))
    }
}

fn decode(part: &str, what: &str) -> Result<Vec<u8>, CipherError> {
    STANDARD
        .decode(part)
        .map_err(|e| CipherError::MalformedEnvelope {
            reason: format!("invalid {what} encoding: {e}"),
        })
}

fn decode_fixed<const N: usize>(part: &str, what: &str) -> Result<[u8; N], CipherError> {
    let bytes = decode(part, what)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| CipherError::MalformedEnvelope {
        reason: format!("{what} must be {N} bytes, got {}", bytes.len()),
    })
}

/// Encrypts and decrypts sensitive field values under one process-wide key.
///
/// Cheap to clone; the derived key is shared read-only behind an `Arc`.
#[derive(Debug, Clone)]
pub struct FieldCipher {
    key: Arc<EncryptionKey>,
}

impl FieldCipher {
    /// Derive the field key from `master`.
    #[must_use]
    pub fn new(master: &MasterSecret) -> Self {
        Self {
            key: Arc::new(EncryptionKey::derive(master)),
        }
    }

    /// Build a cipher from an optional master secret, failing when it is
    /// absent or empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] if `master` is `None` or empty.
    pub fn from_secret(master: Option<&str>) -> Result<Self, ConfigError> {
        let master = MasterSecret::from_lookup(|_| master.map(str::to_owned))?;
        Ok(Self::new(&master))
    }

    /// Encrypt `plaintext` into a serialized envelope.
    ///
    /// Returns `Ok(None)` for empty input.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Encryption`] if the AEAD operation fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<Option<String>, CipherError> {
        Ok(self.seal(plaintext)?.map(|envelope| envelope.to_string()))
    }

    /// Encrypt `plaintext` into a structured [`Envelope`].
    ///
    /// Returns `Ok(None)` for empty input.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Encryption`] if the AEAD operation fails.
    pub fn seal(&self, plaintext: &str) -> Result<Option<Envelope>, CipherError> {
        if plaintext.is_empty() {
            return Ok(None);
        }
        crypto::seal(&self.key, plaintext.as_bytes()).map(|sealed| Some(Envelope(sealed)))
    }

    /// Decrypt a serialized envelope.
    ///
    /// `None` or an empty string means the field is absent and yields
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::MalformedEnvelope`] if the envelope cannot be
    /// parsed, and [`CipherError::AuthenticationFailed`] if the tag does not
    /// verify.
    pub fn decrypt(&self, envelope: Option<&str>) -> Result<Option<String>, CipherError> {
        match envelope {
            None | Some("") => Ok(None),
            Some(raw) => {
                let envelope: Envelope = raw.parse()?;
                self.open(&envelope).map(Some)
            }
        }
    }

    /// Decrypt a structured [`Envelope`].
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::AuthenticationFailed`] if the tag does not
    /// verify, and [`CipherError::MalformedEnvelope`] if the authenticated
    /// plaintext is not UTF-8.
    pub fn open(&self, envelope: &Envelope) -> Result<String, CipherError> {
        let plaintext = crypto::open(&self.key, &envelope.0)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::MalformedEnvelope {
            reason: "plaintext is not valid UTF-8".to_owned(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn cipher() -> FieldCipher {
        FieldCipher::from_secret(Some("unit-test-master-secret")).unwrap()
    }

    #[test]
    fn roundtrip() {
        let cipher = cipher();
        let long = "x".repeat(4096);
        for plaintext in ["a", "alice@example.com", "Zoë Ångström", long.as_str()] {
            let envelope = cipher.encrypt(plaintext).unwrap();
            let decrypted = cipher.decrypt(envelope.as_deref()).unwrap();
            assert_eq!(decrypted.as_deref(), Some(plaintext));
        }
    }

    #[test]
    fn empty_is_absent_both_ways() {
        let cipher = cipher();
        assert_eq!(cipher.encrypt("").unwrap(), None);
        assert_eq!(cipher.decrypt(None).unwrap(), None);
        assert_eq!(cipher.decrypt(Some("")).unwrap(), None);
    }

    #[test]
    fn same_plaintext_gives_different_envelopes() {
        let cipher = cipher();
        let a = cipher.encrypt("same").unwrap().unwrap();
        let b = cipher.encrypt("same").unwrap().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn envelope_has_three_base64_parts() {
        let envelope = cipher().encrypt("hello").unwrap().unwrap();
        let parts: Vec<&str> = envelope.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(STANDARD.decode(parts[0]).unwrap().len(), NONCE_LEN);
        assert_eq!(STANDARD.decode(parts[1]).unwrap().len(), TAG_LEN);
        assert_eq!(STANDARD.decode(parts[2]).unwrap().len(), 5);
    }

    #[test]
    fn flipping_any_ciphertext_or_tag_bit_fails_authentication() {
        let cipher = cipher();
        let envelope = cipher.seal("secret value").unwrap().unwrap();

        let total_bits = (TAG_LEN + envelope.ciphertext().len()) * 8;
        for bit in 0..total_bits {
            let mut sealed = envelope.0.clone();
            let byte = bit / 8;
            let mask = 1u8 << (bit % 8);
            if byte < TAG_LEN {
                sealed.tag[byte] ^= mask;
            } else {
                sealed.ciphertext[byte - TAG_LEN] ^= mask;
            }
            let tampered = Envelope(sealed).to_string();
            let err = cipher.decrypt(Some(&tampered)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AuthenticationFailed, "bit {bit}");
        }
    }

    #[test]
    fn flipping_nonce_bit_fails_authentication() {
        let cipher = cipher();
        let mut sealed = cipher.seal("secret").unwrap().unwrap().0;
        sealed.nonce[0] ^= 1;
        assert!(matches!(
            cipher.open(&Envelope(sealed)),
            Err(CipherError::AuthenticationFailed)
        ));
    }

    #[test]
    fn wrong_master_secret_fails_authentication() {
        let envelope = cipher().encrypt("secret").unwrap();
        let other = FieldCipher::from_secret(Some("different")).unwrap();
        assert!(matches!(
            other.decrypt(envelope.as_deref()),
            Err(CipherError::AuthenticationFailed)
        ));
    }

    #[test]
    fn structurally_invalid_envelopes_are_malformed() {
        let cipher = cipher();
        let good = cipher.encrypt("secret").unwrap().unwrap();
        let (nonce, rest) = good.split_once(':').unwrap();
        let (tag, _) = rest.split_once(':').unwrap();

        let cases = [
            "no-separators".to_owned(),
            format!("{nonce}:{tag}"),
            format!("{good}:extra"),
            format!("{nonce}:{tag}:***"),
            format!("AAAA:{tag}:AAAA"),
            format!("{nonce}:AAAA:AAAA"),
        ];
        for case in &cases {
            let err = cipher.decrypt(Some(case)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedEnvelope, "case {case:?}");
        }
    }

    #[test]
    fn missing_master_secret_fails_construction() {
        let err = FieldCipher::from_secret(None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingSecretAtStartup);
        assert!(FieldCipher::from_secret(Some("")).is_err());
    }

    #[test]
    fn envelope_display_parse_is_stable() {
        let envelope = cipher().seal("value").unwrap().unwrap();
        let parsed: Envelope = envelope.to_string().parse().unwrap();
        assert_eq!(parsed, envelope);
    }
}
