//! Server configuration for `Trustgate`.
//!
//! Loads configuration from environment variables. The signing secret and
//! the field-encryption master secret are mandatory: loading fails when
//! either is missing so the process never starts in a degraded mode.

use std::net::SocketAddr;

use trustgate_core::error::ConfigError;
use trustgate_core::{MasterSecret, SigningSecret};

/// Default bind address when neither `TRUSTGATE_BIND_ADDR` nor `PORT` is set.
const DEFAULT_BIND: ([u8; 4], u16) = ([127, 0, 0, 1], 8300);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Secret used to sign and verify session tokens.
    pub signing_secret: SigningSecret,
    /// Secret the field-encryption key is derived from.
    pub master_secret: MasterSecret,
    /// Whether a `share` query parameter defers the ownership check.
    pub allow_share_links: bool,
    /// Whether to skip `mlock` (for development without root/`CAP_IPC_LOCK`).
    pub disable_mlock: bool,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `PORT`: port to bind on, binds to `0.0.0.0`
    /// - `TRUSTGATE_BIND_ADDR`: full bind address (overrides `PORT`, default: `127.0.0.1:8300`)
    /// - `TRUSTGATE_LOG_LEVEL`: log filter (default: `info`)
    /// - `JWT_SECRET_KEY`: session signing secret (required)
    /// - `FIELD_ENCRYPTION_KEY`: field-encryption master secret (required)
    /// - `TRUSTGATE_ALLOW_SHARE_LINKS`: defer ownership to share links (default: `true`)
    /// - `TRUSTGATE_DISABLE_MLOCK`: skip `mlockall` for dev environments (default: `false`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] if a required secret is unset
    /// or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] if a required secret is unset
    /// or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let signing_secret = SigningSecret::from_lookup(&lookup)?;
        let master_secret = MasterSecret::from_lookup(&lookup)?;

        // Priority: TRUSTGATE_BIND_ADDR > PORT > default 127.0.0.1:8300
        let bind_addr = if let Some(addr) = lookup("TRUSTGATE_BIND_ADDR") {
            addr.parse().unwrap_or_else(|_| SocketAddr::from(DEFAULT_BIND))
        } else if let Some(port_str) = lookup("PORT") {
            let port: u16 = port_str.parse().unwrap_or(DEFAULT_BIND.1);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(DEFAULT_BIND)
        };

        let log_level = lookup("TRUSTGATE_LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        let allow_share_links = lookup("TRUSTGATE_ALLOW_SHARE_LINKS")
            .is_none_or(|v| v != "false" && v != "0");

        let disable_mlock = lookup("TRUSTGATE_DISABLE_MLOCK")
            .is_some_and(|v| v == "true" || v == "1");

        Ok(Self {
            bind_addr,
            log_level,
            signing_secret,
            master_secret,
            allow_share_links,
            disable_mlock,
        })
    }
}
