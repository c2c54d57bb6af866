// SPDX-License-Identifier: MIT

//! Login and token refresh routes.
//!
//! Login order matters: verify the credential first (fail fast, no directory
//! traffic for garbage tokens), then resolve roles, and only touch the user
//! registry once the caller is known to hold at least one role.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::UserProfile;
use crate::services::{IdentityError, TokenPair};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Google ID token from the sign-in widget.
    #[serde(default)]
    credential: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

/// Authenticate with a Google ID token, resolve roles, mint a session.
async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let credential = body
        .credential
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing credential".to_string()))?;

    let claims = state.identity.verify(&credential).await.map_err(|e| match e {
        IdentityError::Invalid(msg) => {
            tracing::warn!(error = %msg, "Login with invalid credential");
            AppError::InvalidCredential(msg)
        }
        IdentityError::Transient(msg) => {
            AppError::Internal(anyhow::anyhow!("identity provider unavailable: {msg}"))
        }
    })?;

    let roles = state.directory.resolve_roles(&claims.email).await;

    if !roles.is_authorized() {
        tracing::warn!(
            email = %claims.email,
            "Login rejected: not a member of any role group"
        );
        return Err(AppError::Forbidden);
    }

    let user = state.registry.upsert_user(&claims.to_upsert(), roles).await?;
    let TokenPair {
        access_token,
        refresh_token,
    } = state.sessions.issue(&user)?;

    tracing::info!(
        email = %user.email,
        is_admin = user.is_admin,
        is_teacher = user.is_teacher,
        is_student = user.is_student,
        "Login successful"
    );

    Ok(Json(LoginResponse {
        access_token,
        refresh_token,
        user: UserProfile::from(&user),
    }))
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

/// Exchange a refresh token for a new access token.
async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>> {
    let refresh_token = body
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing refresh_token".to_string()))?;

    let access_token = state.sessions.refresh(&refresh_token)?;

    Ok(Json(RefreshResponse { access_token }))
}
