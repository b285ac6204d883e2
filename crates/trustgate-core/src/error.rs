//! Error types for `trustgate-core`.
//!
//! Each component has its own error enum. Every enum maps onto the shared
//! [`ErrorKind`] classification so callers at the HTTP boundary can react
//! uniformly. Errors never carry key material, tokens, or plaintext.

use std::fmt;

/// Failure classification shared by every component of the trust core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No bearer credential was supplied.
    MissingToken,
    /// The session token is structurally invalid.
    Malformed,
    /// The session token signature does not verify.
    InvalidSignature,
    /// The session token is past its expiry.
    Expired,
    /// The token subject does not own the requested resource.
    OwnershipMismatch,
    /// A stored password hash could not be parsed.
    CorruptCredential,
    /// A field envelope is structurally invalid.
    MalformedEnvelope,
    /// A field envelope failed its authentication tag check.
    AuthenticationFailed,
    /// A required secret was not supplied at process start.
    MissingSecretAtStartup,
}

impl ErrorKind {
    /// Stable, machine-readable code used in HTTP error bodies.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::Malformed => "malformed_token",
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "token_expired",
            Self::OwnershipMismatch => "ownership_mismatch",
            Self::CorruptCredential => "corrupt_credential",
            Self::MalformedEnvelope => "malformed_envelope",
            Self::AuthenticationFailed => "authentication_failed",
            Self::MissingSecretAtStartup => "missing_secret",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors from password hashing and verification.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// The stored hash is not a valid PHC string or uses unknown parameters.
    #[error("stored credential is corrupt: {reason}")]
    CorruptCredential { reason: String },

    /// Hashing a new password failed (salt generation or parameter error).
    #[error("password hashing failed: {reason}")]
    Hashing { reason: String },
}

impl PasswordError {
    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::CorruptCredential
    }
}

/// Errors from session token verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Wrong number of parts, bad encoding, unsupported header, or
    /// unparseable claims.
    #[error("malformed token: {reason}")]
    Malformed { reason: String },

    /// The signature does not match the header and payload.
    #[error("invalid token signature")]
    InvalidSignature,

    /// The token signature is valid but the token has expired.
    #[error("token expired at {expired_at}")]
    Expired { expired_at: i64 },

    /// The signing secret could not key the MAC. No signature can be made
    /// or checked.
    #[error("signing key rejected: {reason}")]
    SigningKey { reason: String },
}

impl TokenError {
    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed { .. } => ErrorKind::Malformed,
            Self::InvalidSignature => ErrorKind::InvalidSignature,
            Self::Expired { .. } => ErrorKind::Expired,
            Self::SigningKey { .. } => ErrorKind::InvalidSignature,
        }
    }
}

/// Denials produced by the authorization gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// The request carried no bearer credential.
    #[error("no bearer token provided")]
    MissingToken,

    /// The bearer credential failed verification.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The token subject is not the owner named in the request path.
    #[error("token subject does not own this resource")]
    OwnershipMismatch,
}

impl GateError {
    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingToken => ErrorKind::MissingToken,
            Self::Token(inner) => inner.kind(),
            Self::OwnershipMismatch => ErrorKind::OwnershipMismatch,
        }
    }

    /// Short human-readable reason suitable for a 401 response body.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingToken => "please provide a bearer token",
            Self::Token(TokenError::Expired { .. }) => "token expired, please log in again",
            Self::Token(_) => "invalid token",
            Self::OwnershipMismatch => "request's user and token's user don't match",
        }
    }
}

/// Errors from field encryption and decryption.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The envelope does not have the `nonce:tag:ciphertext` structure.
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },

    /// The authentication tag did not verify (tampering or wrong key).
    #[error("envelope authentication failed")]
    AuthenticationFailed,

    /// The AEAD encryption call itself failed.
    #[error("field encryption failed: {reason}")]
    Encryption { reason: String },
}

impl CipherError {
    /// Classification of this error.
    ///
    /// An encryption-side failure has no dedicated kind; it means the
    /// envelope could not be produced, so it is reported as malformed.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedEnvelope { .. } | Self::Encryption { .. } => {
                ErrorKind::MalformedEnvelope
            }
            Self::AuthenticationFailed => ErrorKind::AuthenticationFailed,
        }
    }
}

/// Errors raised while loading process configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required secret was absent or empty.
    #[error("required secret '{name}' is not set")]
    MissingSecret { name: &'static str },
}

impl ConfigError {
    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::MissingSecretAtStartup
    }
}
