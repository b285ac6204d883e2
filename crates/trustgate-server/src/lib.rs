//! `Trustgate` HTTP server.
//!
//! Wires the trust core, the identity directory and the HTTP routes into an
//! Axum router. Per-user routes pass through the authorization gate
//! middleware before any handler runs.

pub mod config;
pub mod directory;
pub mod error;
pub mod hardening;
pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::middleware as axum_mw;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{authenticated_middleware, gate_middleware};
use crate::state::AppState;

/// Maximum number of register/login requests in flight at once, across
/// both routes.
const PASSWORD_CONCURRENCY: usize = 16;

/// One semaphore shared by every route the layer is applied to.
fn password_limit(max: usize) -> GlobalConcurrencyLimitLayer {
    GlobalConcurrencyLimitLayer::new(max)
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let owner_routes = routes::users::gated_router().route_layer(axum_mw::from_fn_with_state(
        Arc::clone(&state),
        gate_middleware,
    ));

    let session_routes = Router::new()
        .nest("/v1/auth", routes::sys::auth_router())
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            authenticated_middleware,
        ));

    // Password hashing is CPU-bound, so cap concurrent logins and signups.
    let account_routes = routes::users::router().layer(password_limit(PASSWORD_CONCURRENCY));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .nest("/v1/sys", routes::sys::router())
        .merge(account_routes)
        .merge(owner_routes)
        .merge(session_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}
