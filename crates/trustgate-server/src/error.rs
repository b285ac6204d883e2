//! HTTP error types for the `Trustgate` server.
//!
//! Maps domain errors from `trustgate-core` and the identity directory into
//! HTTP responses. Every error produces a JSON body with a machine-readable
//! `error` code and a human-readable `message`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use trustgate_core::error::{CipherError, GateError, PasswordError, TokenError};
use trustgate_storage::StorageError;

use crate::directory::DirectoryError;

/// Message returned for every failed login, whatever the cause.
pub const BAD_CREDENTIALS: &str = "the provided credentials are incorrect";

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// The authorization gate denied the request.
    Denied(GateError),
    /// Login failed. Deliberately carries no detail.
    BadCredentials,
    /// Requested resource not found.
    NotFound(String),
    /// Client sent invalid input.
    BadRequest(String),
    /// A conflict (e.g., email already registered).
    Conflict(String),
    /// Internal server error. The message is logged, not returned.
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Denied(err) => (
                StatusCode::UNAUTHORIZED,
                err.kind().code(),
                err.reason().to_owned(),
            ),
            Self::BadCredentials => (
                StatusCode::UNAUTHORIZED,
                "bad_credentials",
                BAD_CREDENTIALS.to_owned(),
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_owned(),
                )
            }
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<GateError> for AppError {
    fn from(err: GateError) -> Self {
        Self::Denied(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        Self::Denied(GateError::Token(err))
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<CipherError> for AppError {
    fn from(err: CipherError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound { .. } => Self::NotFound(err.to_string()),
            DirectoryError::EmailTaken => Self::Conflict(err.to_string()),
            DirectoryError::Invalid { .. } => Self::BadRequest(err.to_string()),
            DirectoryError::Password(_)
            | DirectoryError::Cipher(_)
            | DirectoryError::Storage(_)
            | DirectoryError::Corrupt { .. } => Self::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn gate_denials_are_401_with_distinct_codes() {
        let cases = [
            (GateError::MissingToken, "missing_token"),
            (GateError::Token(TokenError::InvalidSignature), "invalid_signature"),
            (
                GateError::Token(TokenError::Expired { expired_at: 0 }),
                "token_expired",
            ),
            (GateError::OwnershipMismatch, "ownership_mismatch"),
        ];
        for (err, code) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(body_json(response).await["error"], code);
        }
    }

    #[tokio::test]
    async fn internal_errors_hide_detail() {
        let response = AppError::Internal("storage exploded at key users/u1".to_owned())
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["message"], "internal server error");
    }

    #[test]
    fn directory_errors_map_to_statuses() {
        let status = |err: DirectoryError| AppError::from(err).into_response().status();
        assert_eq!(status(DirectoryError::EmailTaken), StatusCode::CONFLICT);
        assert_eq!(
            status(DirectoryError::NotFound { id: "u1".to_owned() }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(DirectoryError::Invalid { reason: "x".to_owned() }),
            StatusCode::BAD_REQUEST
        );
    }
}
