// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
///
/// Every failure surfaced to a client is one of these variants; third-party
/// error types never cross a handler boundary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The presented identity credential failed verification.
    #[error("Invalid identity credential: {0}")]
    InvalidCredential(String),

    /// Identity verified but the caller lacks the required role.
    #[error("Insufficient privileges")]
    Forbidden,

    /// Missing, malformed, or expired session token.
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Directory API failure on an admin group-management call.
    /// (Membership checks during login degrade instead of surfacing this.)
    #[error("Directory API error: {0}")]
    DirectoryApi(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::InvalidCredential(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_credential",
                Some(msg.clone()),
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::DirectoryApi(msg) => {
                tracing::error!(error = %msg, "Directory API error");
                (StatusCode::BAD_GATEWAY, "directory_error", None)
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
