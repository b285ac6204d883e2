//! Authorization gate middleware for `Trustgate`.
//!
//! Runs the [`AuthorizationGate`](trustgate_core::AuthorizationGate) on the
//! `Authorization` header, the `{user}` path parameter and the `share` query
//! parameter, then injects the verified [`Principal`] into the request
//! extensions for downstream handlers. Denials never reach a handler.
//!
//! Every outcome is either the handler's response or a 401 from the gate.
//! A query string that does not parse carries no share id, and a path
//! owner that does not parse can never match a verified subject.

use std::sync::Arc;

use axum::extract::rejection::{QueryRejection, RawPathParamsRejection};
use axum::extract::{Query, RawPathParams, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;

use trustgate_core::error::GateError;
use trustgate_core::{AccessRequest, Principal};

use crate::error::AppError;
use crate::state::AppState;

/// Name of the path parameter that carries the resource owner.
pub const OWNER_PARAM: &str = "user";

/// Query parameters the gate looks at.
#[derive(Debug, Default, Deserialize)]
pub struct ShareParams {
    /// Share-link id, if the request came through a share link.
    pub share: Option<String>,
}

/// Gate for owner-scoped routes. The owner is the `{user}` path parameter.
///
/// Attach with `route_layer` so path parameters are already matched.
pub async fn gate_middleware(
    State(state): State<Arc<AppState>>,
    params: Result<RawPathParams, RawPathParamsRejection>,
    query: Result<Query<ShareParams>, QueryRejection>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let share = query.ok().and_then(|Query(q)| q.share);

    let Ok(params) = params else {
        // Authenticate first so a missing or bad token is still reported
        // as such, then refuse the unreadable owner.
        let authorization = bearer_header(&req);
        state.gate.authorize(&AccessRequest {
            authorization,
            owner: None,
            share: None,
        })?;
        return Err(GateError::OwnershipMismatch.into());
    };
    let owner = params
        .iter()
        .find(|(name, _)| *name == OWNER_PARAM)
        .map(|(_, value)| value.to_owned());

    admit(&state, owner.as_deref(), share.as_deref(), req, next).await
}

/// Gate for routes that only require a valid session.
pub async fn authenticated_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    admit(&state, None, None, req, next).await
}

async fn admit(
    state: &AppState,
    owner: Option<&str>,
    share: Option<&str>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let authorization = bearer_header(&req);
    let principal: Principal = state.gate.authorize(&AccessRequest {
        authorization,
        owner,
        share,
    })?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

fn bearer_header(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}
