// SPDX-License-Identifier: MIT

//! Per-request authorization gates.
//!
//! Each gate verifies the bearer access token (signature + expiry, no
//! directory re-check), confirms the subject is still an active user in the
//! registry, applies its role predicate over the token's role claims, and
//! attaches the principal to the request. A deactivated user is denied even
//! while holding an unexpired token.

use crate::error::AppError;
use crate::models::{RoleFlags, User};
use crate::services::SessionClaims;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Authenticated principal attached to the request after a gate passes.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub claims: SessionClaims,
}

/// Role predicate applied by a gate variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleRequirement {
    Any,
    Admin,
    Teacher,
    /// Student-only excludes admins: some features are for students alone.
    Student,
    AdminOrTeacher,
    AdminOrStudent,
}

impl RoleRequirement {
    fn allows(&self, roles: RoleFlags) -> bool {
        match self {
            RoleRequirement::Any => roles.is_authorized(),
            RoleRequirement::Admin => roles.is_admin,
            RoleRequirement::Teacher => roles.is_teacher,
            RoleRequirement::Student => roles.is_student && !roles.is_admin,
            RoleRequirement::AdminOrTeacher => roles.is_admin || roles.is_teacher,
            RoleRequirement::AdminOrStudent => roles.is_admin || roles.is_student,
        }
    }
}

/// Gate: any authenticated active user.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(state, request, next, RoleRequirement::Any).await
}

/// Gate: admin only.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(state, request, next, RoleRequirement::Admin).await
}

/// Gate: teacher only.
pub async fn require_teacher(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(state, request, next, RoleRequirement::Teacher).await
}

/// Gate: student only (excludes admins).
pub async fn require_student(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(state, request, next, RoleRequirement::Student).await
}

/// Gate: admin or teacher.
pub async fn require_admin_or_teacher(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(state, request, next, RoleRequirement::AdminOrTeacher).await
}

/// Gate: admin or student.
pub async fn require_admin_or_student(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(state, request, next, RoleRequirement::AdminOrStudent).await
}

async fn authorize(
    state: Arc<AppState>,
    mut request: Request,
    next: Next,
    requirement: RoleRequirement,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or(AppError::InvalidToken)?;

    let claims = state.sessions.verify_access(token)?;

    let user = state
        .registry
        .find_active(&claims.sub)
        .await?
        .ok_or_else(|| {
            tracing::warn!(email = %claims.sub, "Token subject not found or inactive");
            AppError::InvalidToken
        })?;

    if !requirement.allows(claims.roles()) {
        tracing::warn!(
            email = %user.email,
            requirement = ?requirement,
            "Role requirement not met"
        );
        return Err(AppError::Forbidden);
    }

    request.extensions_mut().insert(CurrentUser { user, claims });
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn flags(is_admin: bool, is_teacher: bool, is_student: bool) -> RoleFlags {
        RoleFlags {
            is_admin,
            is_teacher,
            is_student,
        }
    }

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn role_predicates() {
        let admin = flags(true, false, false);
        let teacher = flags(false, true, false);
        let student = flags(false, false, true);
        let admin_student = flags(true, false, true);
        let none = flags(false, false, false);

        assert!(RoleRequirement::Any.allows(admin));
        assert!(RoleRequirement::Any.allows(student));
        assert!(!RoleRequirement::Any.allows(none));

        assert!(RoleRequirement::Admin.allows(admin));
        assert!(!RoleRequirement::Admin.allows(teacher));

        assert!(RoleRequirement::Student.allows(student));
        // Student-only excludes admins even when they also hold the
        // student role.
        assert!(!RoleRequirement::Student.allows(admin_student));
        assert!(!RoleRequirement::Student.allows(admin));

        assert!(RoleRequirement::AdminOrTeacher.allows(admin));
        assert!(RoleRequirement::AdminOrTeacher.allows(teacher));
        assert!(!RoleRequirement::AdminOrTeacher.allows(student));

        assert!(RoleRequirement::AdminOrStudent.allows(student));
        assert!(RoleRequirement::AdminOrStudent.allows(admin));
        assert!(!RoleRequirement::AdminOrStudent.allows(teacher));
    }
}
