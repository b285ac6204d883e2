//! Users service routes: `/v1/users/*`
//!
//! Registration and login are public. Everything addressed by `{user}` sits
//! behind the gate middleware, which has already verified the session token
//! and the path owner by the time a handler runs.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use trustgate_core::Principal;
use trustgate_core::error::PasswordError;
use trustgate_core::gate::check_ownership;

use crate::directory::{DirectoryError, NewUser, ProfileUpdate, UserProfile};
use crate::error::AppError;
use crate::state::AppState;

/// Build the public users router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/users", post(register))
        .route("/v1/users/login", post(login))
}

/// Build the owner-scoped users router. Must sit behind the gate middleware.
pub fn gated_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/v1/users/{user}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/v1/users/validate/{user}", get(validate))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body returned by both registration and login.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserProfile,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub user: String,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Create an account and start a session for it. Anonymous accounts have
/// no credentials, so this is the only session they ever get.
async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewUser>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let record = state.directory.register(body).await?;
    let token = issue_token(&state, &record.id)?;
    let user = state.directory.reveal(&record)?;
    Ok((StatusCode::CREATED, Json(SessionResponse { user, token })))
}

/// Exchange an email and password for a session token.
///
/// Unknown email, missing password and wrong password all produce the same
/// response.
async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let record = state
        .directory
        .authenticate(&body.email, &body.password)
        .await
        .map_err(login_error)?
        .ok_or(AppError::BadCredentials)?;

    let token = issue_token(&state, &record.id)?;
    let user = state.directory.reveal(&record)?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(SessionResponse { user, token }))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(user): Path<String>,
) -> Result<Json<UserProfile>, AppError> {
    require_owner(&principal, &user)?;
    let record = state.directory.get(&user).await?;
    Ok(Json(state.directory.reveal(&record)?))
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(user): Path<String>,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>, AppError> {
    require_owner(&principal, &user)?;
    let record = state.directory.update_profile(&user, body).await?;
    Ok(Json(state.directory.reveal(&record)?))
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(user): Path<String>,
) -> Result<StatusCode, AppError> {
    require_owner(&principal, &user)?;
    state.directory.delete(&user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Confirm that the caller's token belongs to `{user}`.
async fn validate(
    Extension(principal): Extension<Principal>,
    Path(user): Path<String>,
) -> Result<Json<ValidateResponse>, AppError> {
    require_owner(&principal, &user)?;
    Ok(Json(ValidateResponse { valid: true, user }))
}

/// A stored hash that cannot be read looks like a wrong password to the
/// caller. Anything else is a server fault.
fn login_error(err: DirectoryError) -> AppError {
    match err {
        DirectoryError::Password(e @ PasswordError::CorruptCredential { .. }) => {
            warn!(error = %e, "stored credential could not be checked");
            AppError::BadCredentials
        }
        other => other.into(),
    }
}

fn issue_token(state: &AppState, user_id: &str) -> Result<String, AppError> {
    state
        .codec
        .issue(user_id)
        .map_err(|e| AppError::Internal(format!("token issue failed: {e}")))
}

/// Account data has no share links, so a share-deferred request still has
/// to come from the owner.
fn require_owner(principal: &Principal, user: &str) -> Result<(), AppError> {
    check_ownership(&principal.subject_id, Some(user))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;

    use super::*;

    #[test]
    fn corrupt_stored_hash_is_bad_credentials() {
        let err = login_error(DirectoryError::Password(PasswordError::CorruptCredential {
            reason: "salt invalid".to_owned(),
        }));
        assert!(matches!(err, AppError::BadCredentials));
    }

    #[test]
    fn failed_hashing_task_is_internal() {
        let err = login_error(DirectoryError::Password(PasswordError::Hashing {
            reason: "verification task failed: panicked".to_owned(),
        }));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
