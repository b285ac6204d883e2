//! Request-boundary authorization gate.
//!
//! Every per-user route runs the same three steps before any handler sees
//! the request:
//!
//! 1. [`extract_bearer`] pulls the token out of the `Authorization` header.
//! 2. [`AuthorizationGate::authenticate`] verifies it with the
//!    [`SessionTokenCodec`].
//! 3. [`check_ownership`] compares the verified subject to the resource
//!    owner named in the request path.
//!
//! The gate holds no mutable state. The same request always produces the
//! same decision, apart from token expiry.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::GateError;
use crate::session::SessionTokenCodec;

/// What the gate needs to know about an incoming request.
pub trait GateRequest {
    /// Raw `Authorization` header value, if any.
    fn authorization(&self) -> Option<&str>;

    /// Owner id named by the request path. `None` for routes that only
    /// require authentication.
    fn resource_owner(&self) -> Option<&str>;

    /// Share-link id carried by the request, if any.
    fn share_id(&self) -> Option<&str> {
        None
    }
}

/// A borrowed view of the request fields the gate inspects.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessRequest<'a> {
    pub authorization: Option<&'a str>,
    pub owner: Option<&'a str>,
    pub share: Option<&'a str>,
}

impl GateRequest for AccessRequest<'_> {
    fn authorization(&self) -> Option<&str> {
        self.authorization
    }

    fn resource_owner(&self) -> Option<&str> {
        self.owner
    }

    fn share_id(&self) -> Option<&str> {
        self.share
    }
}

/// The verified caller forwarded to downstream handlers on allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Subject id from the verified token.
    pub subject_id: String,
    /// Share-link id when ownership was deferred to share validation.
    pub share_id: Option<String>,
}

/// Extract the bearer credential from an `Authorization` header value.
///
/// # Errors
///
/// Returns [`GateError::MissingToken`] if the header is absent, uses a
/// scheme other than `Bearer`, or carries an empty credential.
pub fn extract_bearer(header: Option<&str>) -> Result<&str, GateError> {
    let header = header.ok_or(GateError::MissingToken)?.trim();
    let (scheme, token) = header.split_once(' ').ok_or(GateError::MissingToken)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(GateError::MissingToken);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(GateError::MissingToken);
    }
    Ok(token)
}

/// Check that `subject_id` owns the resource named by `owner`.
///
/// # Errors
///
/// Returns [`GateError::OwnershipMismatch`] if `owner` is present and
/// differs from `subject_id`.
pub fn check_ownership(subject_id: &str, owner: Option<&str>) -> Result<(), GateError> {
    match owner {
        Some(owner) if owner != subject_id => Err(GateError::OwnershipMismatch),
        _ => Ok(()),
    }
}

/// Authorization decision function used by the gateway.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    codec: SessionTokenCodec,
    allow_share_links: bool,
}

impl AuthorizationGate {
    /// Create a gate that enforces ownership on every owner-scoped request.
    #[must_use]
    pub fn new(codec: SessionTokenCodec) -> Self {
        Self {
            codec,
            allow_share_links: false,
        }
    }

    /// Defer the ownership check to share-link validation when a request
    /// carries a share id. Authentication is still required.
    #[must_use]
    pub fn with_share_links(mut self, allow: bool) -> Self {
        self.allow_share_links = allow;
        self
    }

    /// Verify `token` and return its subject.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Token`] with the codec's failure.
    pub fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<String, GateError> {
        Ok(self.codec.verify_at(token, now)?)
    }

    /// Decide whether `request` may proceed, using the wall clock.
    ///
    /// # Errors
    ///
    /// Returns the [`GateError`] describing why the request is denied.
    pub fn authorize(&self, request: &impl GateRequest) -> Result<Principal, GateError> {
        self.authorize_at(request, Utc::now())
    }

    /// Decide whether `request` may proceed as of `now`.
    ///
    /// # Errors
    ///
    /// Returns the [`GateError`] describing why the request is denied.
    pub fn authorize_at(
        &self,
        request: &impl GateRequest,
        now: DateTime<Utc>,
    ) -> Result<Principal, GateError> {
        let decision = self.decide(request, now);
        if let Err(ref err) = decision {
            debug!(kind = %err.kind(), "request denied by authorization gate");
        }
        decision
    }

    fn decide(&self, request: &impl GateRequest, now: DateTime<Utc>) -> Result<Principal, GateError> {
        let token = extract_bearer(request.authorization())?;
        let subject_id = self.authenticate(token, now)?;

        let share_id = request
            .share_id()
            .filter(|share| self.allow_share_links && !share.is_empty());
        if share_id.is_none() {
            check_ownership(&subject_id, request.resource_owner())?;
        }

        Ok(Principal {
            subject_id,
            share_id: share_id.map(str::to_owned),
        })
    }
}
