// SPDX-License-Identifier: MIT

//! Authenticated API routes.
//!
//! Role gates are applied per route group here rather than in routes/mod.rs,
//! since different groups need different requirements.

use crate::error::{AppError, Result};
use crate::middleware::auth::{require_admin, require_admin_or_teacher, require_auth};
use crate::middleware::CurrentUser;
use crate::models::UserProfile;
use crate::AppState;
use axum::{
    extract::{Path, State},
    middleware,
    routing::{delete, get},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::ValidateEmail;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let any_user = Router::new()
        .route("/api/me", get(get_me))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Teachers may read group rosters; changing them is admin-only.
    let roster_read = Router::new()
        .route("/api/groups/{role}/members", get(list_group_members))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_or_teacher,
        ));

    let admin_only = Router::new()
        .route("/api/admin/groups/{role}/members", axum::routing::post(add_group_member))
        .route(
            "/api/admin/groups/{role}/members/{email}",
            delete(remove_group_member),
        )
        .route("/api/admin/users/{email}", delete(deactivate_user))
        .route_layer(middleware::from_fn_with_state(state, require_admin));

    any_user.merge(roster_read).merge(admin_only)
}

// ─── User Profile ────────────────────────────────────────────

/// Get the current user's profile.
async fn get_me(Extension(current): Extension<CurrentUser>) -> Json<UserProfile> {
    Json(UserProfile::from(&current.user))
}

// ─── Group Management ────────────────────────────────────────

#[derive(Serialize)]
pub struct MembersResponse {
    pub members: Vec<String>,
}

/// List members of a role group.
async fn list_group_members(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
) -> Result<Json<MembersResponse>> {
    let group = group_address(&state, &role)?;

    let members = state
        .directory
        .list_members(group)
        .await
        .map_err(|e| AppError::DirectoryApi(e.to_string()))?;

    Ok(Json(MembersResponse { members }))
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    email: String,
}

#[derive(Serialize)]
pub struct MemberChangeResponse {
    pub success: bool,
}

/// Add a member to a role group.
async fn add_group_member(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<AddMemberRequest>,
) -> Result<Json<MemberChangeResponse>> {
    let group = group_address(&state, &role)?;

    if !body.email.validate_email() {
        return Err(AppError::BadRequest(format!(
            "invalid email address: {}",
            body.email
        )));
    }

    state
        .directory
        .add_member(group, &body.email)
        .await
        .map_err(|e| AppError::DirectoryApi(e.to_string()))?;

    tracing::info!(
        actor = %current.user.email,
        member = %body.email,
        group = %group,
        "Group member added"
    );

    Ok(Json(MemberChangeResponse { success: true }))
}

/// Remove a member from a role group.
async fn remove_group_member(
    State(state): State<Arc<AppState>>,
    Path((role, email)): Path<(String, String)>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<MemberChangeResponse>> {
    let group = group_address(&state, &role)?;

    state
        .directory
        .remove_member(group, &email)
        .await
        .map_err(|e| AppError::DirectoryApi(e.to_string()))?;

    tracing::info!(
        actor = %current.user.email,
        member = %email,
        group = %group,
        "Group member removed"
    );

    Ok(Json(MemberChangeResponse { success: true }))
}

/// Map a role name from the URL to the configured group address.
fn group_address<'a>(state: &'a AppState, role: &str) -> Result<&'a str> {
    let groups = state.directory.groups();
    match role {
        "admin" => Ok(&groups.admin),
        "teacher" => Ok(&groups.teacher),
        "student" => Ok(&groups.student),
        other => Err(AppError::BadRequest(format!("invalid role group: {other}"))),
    }
}

// ─── User Deactivation ───────────────────────────────────────

/// Deactivate a user. Their tokens stop working at the next request even
/// though the tokens themselves remain unexpired.
async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<MemberChangeResponse>> {
    if email == current.user.email {
        return Err(AppError::BadRequest(
            "cannot deactivate your own account".to_string(),
        ));
    }

    state.registry.deactivate_user(&email).await?;

    tracing::info!(actor = %current.user.email, target = %email, "User deactivated");

    Ok(Json(MemberChangeResponse { success: true }))
}

// ─── Live Status ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LiveStatusQuery {
    channel: String,
}

/// Check whether a channel is live. Public (mounted outside the gates).
pub async fn live_status(
    State(state): State<Arc<AppState>>,
    axum::extract::Query(params): axum::extract::Query<LiveStatusQuery>,
) -> Json<crate::services::LiveStatus> {
    Json(state.live_status.check_channel(&params.channel).await)
}
