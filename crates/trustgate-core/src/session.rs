//! Stateless signed session tokens.
//!
//! Tokens use the compact JWS layout `header.payload.signature`, each part
//! unpadded base64url. The header is fixed to `{"alg":"HS256","typ":"JWT"}`
//! and the signature is HMAC-SHA256 over the ASCII `header.payload` using
//! the shared [`SigningSecret`]. The payload carries `id` (subject), `iat`
//! and `exp` in epoch seconds, matching what the other services emit.
//!
//! # Verification order
//!
//! 1. Structure: three non-empty parts, valid base64url. Otherwise
//!    [`TokenError::Malformed`].
//! 2. Signature, compared with `subtle::ConstantTimeEq`. Otherwise
//!    [`TokenError::InvalidSignature`].
//! 3. Header and claims parse, `alg` is `HS256`. Otherwise
//!    [`TokenError::Malformed`].
//! 4. `now >= exp` is [`TokenError::Expired`].
//!
//! Claims are only parsed after the signature checks out, so attacker
//! controlled JSON never reaches the claim logic.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::TokenError;
use crate::secret::SigningSecret;

type HmacSha256 = Hmac<Sha256>;

/// Fixed session lifetime.
pub const SESSION_TTL_DAYS: i64 = 7;

/// Signature algorithm name written into and required from the header.
const ALGORITHM: &str = "HS256";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user) id.
    #[serde(rename = "id")]
    pub subject_id: String,
    /// Issued-at, epoch seconds.
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Expiry, epoch seconds.
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

/// Issues and verifies session tokens with a shared HMAC secret.
///
/// Cheap to clone; the secret is shared read-only behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SessionTokenCodec {
    secret: Arc<SigningSecret>,
    ttl: Duration,
}

impl SessionTokenCodec {
    /// Create a codec with the fixed seven-day session lifetime.
    #[must_use]
    pub fn new(secret: SigningSecret) -> Self {
        Self {
            secret: Arc::new(secret),
            ttl: Duration::days(SESSION_TTL_DAYS),
        }
    }

    /// Issue a token for `subject_id`, valid from now.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Malformed`] if claim serialization fails and
    /// [`TokenError::SigningKey`] if the secret cannot key the MAC.
    pub fn issue(&self, subject_id: &str) -> Result<String, TokenError> {
        self.issue_at(subject_id, Utc::now())
    }

    /// Issue a token for `subject_id` as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Malformed`] if claim serialization fails and
    /// [`TokenError::SigningKey`] if the secret cannot key the MAC.
    pub fn issue_at(&self, subject_id: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = SessionClaims {
            subject_id: subject_id.to_owned(),
            issued_at: now.timestamp(),
            expires_at: (now + self.ttl).timestamp(),
        };
        let header = Header {
            alg: ALGORITHM.to_owned(),
            typ: Some("JWT".to_owned()),
        };

        let header_json = serde_json::to_vec(&header).map_err(malformed)?;
        let claims_json = serde_json::to_vec(&claims).map_err(malformed)?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json)
        );
        let signature = self.sign(signing_input.as_bytes())?;

        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Verify `token` against the wall clock and return its subject id.
    ///
    /// # Errors
    ///
    /// See the module documentation for the verification order.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify `token` as of `now` and return its subject id.
    ///
    /// # Errors
    ///
    /// See the module documentation for the verification order.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        self.verify_claims_at(token, now)
            .map(|claims| claims.subject_id)
    }

    /// Verify `token` as of `now` and return all of its claims.
    ///
    /// Callers that cache the result must re-check `expires_at` themselves.
    ///
    /// # Errors
    ///
    /// See the module documentation for the verification order.
    pub fn verify_claims_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionClaims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed {
                reason: "expected three dot-separated parts".to_owned(),
            });
        };
        if header_b64.is_empty() || payload_b64.is_empty() || signature_b64.is_empty() {
            return Err(TokenError::Malformed {
                reason: "empty token part".to_owned(),
            });
        }

        let header_bytes = decode_part(header_b64, "header")?;
        let payload_bytes = decode_part(payload_b64, "payload")?;
        let signature = decode_part(signature_b64, "signature")?;

        // The MAC covers the encoded text exactly as received.
        let signing_input_len = header_b64.len() + 1 + payload_b64.len();
        let expected = self.sign(&token.as_bytes()[..signing_input_len])?;
        if !bool::from(expected.as_slice().ct_eq(signature.as_slice())) {
            debug!("session token rejected: signature mismatch");
            return Err(TokenError::InvalidSignature);
        }

        let header: Header = serde_json::from_slice(&header_bytes).map_err(malformed)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::Malformed {
                reason: format!("unsupported algorithm '{}'", header.alg),
            });
        }
        let claims: SessionClaims = serde_json::from_slice(&payload_bytes).map_err(malformed)?;

        if now.timestamp() >= claims.expires_at {
            debug!(expires_at = claims.expires_at, "session token rejected: expired");
            return Err(TokenError::Expired {
                expired_at: claims.expires_at,
            });
        }

        Ok(claims)
    }

    fn sign(&self, input: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut mac = <HmacSha256 as KeyInit>::new_from_slice(self.secret.as_bytes()).map_err(
            |e| TokenError::SigningKey {
                reason: e.to_string(),
            },
        )?;
        mac.update(input);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn decode_part(part: &str, what: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|e| TokenError::Malformed {
            reason: format!("invalid {what} encoding: {e}"),
        })
}

fn malformed(err: serde_json::Error) -> TokenError {
    TokenError::Malformed {
        reason: err.to_string(),
    }
}
