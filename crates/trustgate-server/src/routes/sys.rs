//! System routes: `/v1/sys/*` and `/v1/auth/*`.
//!
//! Liveness for load balancers, plus the authentication-only `whoami`
//! endpoint that echoes the verified caller.

use std::sync::Arc;

use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;

use trustgate_core::Principal;

use crate::state::AppState;

/// Build the unauthenticated `/v1/sys` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

/// Build the `/v1/auth` router. Must sit behind the authentication layer.
pub fn auth_router() -> Router<Arc<AppState>> {
    Router::new().route("/whoami", get(whoami))
}

// ── Response types ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share: Option<String>,
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Return the subject of the caller's session token.
async fn whoami(Extension(principal): Extension<Principal>) -> Json<WhoamiResponse> {
    Json(WhoamiResponse {
        user: principal.subject_id,
        share: principal.share_id,
    })
}
