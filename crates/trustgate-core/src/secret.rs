//! Process secrets supplied by the environment at startup.
//!
//! Both secrets are required. Loading fails with
//! [`ConfigError::MissingSecret`] when a variable is unset or empty, so a
//! misconfigured process refuses to start instead of failing on first use.
//! The bytes are zeroized on drop and never appear in `Debug` output.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::ConfigError;

/// Environment variable holding the session signing secret.
pub const SIGNING_SECRET_VAR: &str = "JWT_SECRET_KEY";

/// Environment variable holding the field-encryption master secret.
pub const MASTER_SECRET_VAR: &str = "FIELD_ENCRYPTION_KEY";

/// Shared symmetric secret used to sign and verify session tokens.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningSecret(Vec<u8>);

/// Master secret from which the field-encryption key is derived.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret(Vec<u8>);

macro_rules! secret_impls {
    ($ty:ident, $var:expr) => {
        impl $ty {
            /// Wrap raw secret bytes.
            ///
            /// # Errors
            ///
            /// Returns [`ConfigError::MissingSecret`] if `bytes` is empty.
            pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
                let bytes = bytes.into();
                if bytes.is_empty() {
                    return Err(ConfigError::MissingSecret { name: $var });
                }
                Ok(Self(bytes))
            }

            /// Load the secret through `lookup`, which maps a variable name
            /// to its value.
            ///
            /// # Errors
            ///
            /// Returns [`ConfigError::MissingSecret`] if the variable is
            /// unset or empty.
            pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
            where
                F: Fn(&str) -> Option<String>,
            {
                let value = lookup($var).ok_or(ConfigError::MissingSecret { name: $var })?;
                Self::new(value.into_bytes())
            }

            /// Load the secret from the process environment.
            ///
            /// # Errors
            ///
            /// Returns [`ConfigError::MissingSecret`] if the variable is
            /// unset or empty.
            pub fn from_env() -> Result<Self, ConfigError> {
                Self::from_lookup(|name| std::env::var(name).ok())
            }

            /// Borrow the raw secret bytes. Never log them.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($ty)).field(&"[REDACTED]").finish()
            }
        }
    };
}

secret_impls!(SigningSecret, SIGNING_SECRET_VAR);
secret_impls!(MasterSecret, MASTER_SECRET_VAR);
