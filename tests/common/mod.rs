// SPDX-License-Identifier: MIT

//! Shared test harness: real router over offline backends.
//!
//! The identity verifier runs in static-key mode (HS256 with a shared test
//! secret), the directory uses the static in-memory backend, and the user
//! registry is the in-memory store, so the full login flow runs without any
//! network.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use lab_portal_api::config::Config;
use lab_portal_api::db::UserRegistry;
use lab_portal_api::routes::create_router;
use lab_portal_api::services::{
    DirectoryService, GoogleIdentityVerifier, LiveStatusService, RoleGroups, SessionService,
};
use lab_portal_api::AppState;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

pub const IDENTITY_KID: &str = "test-identity-kid";
pub const IDENTITY_SECRET: &[u8] = b"identity-test-secret-32-bytes!!!";

/// Role names usable in the `members` list passed to `create_test_app`.
pub const ADMIN: &str = "admin";
pub const TEACHER: &str = "teacher";
pub const STUDENT: &str = "student";

fn test_groups(config: &Config) -> RoleGroups {
    RoleGroups {
        admin: config.admin_group.clone(),
        teacher: config.teacher_group.clone(),
        student: config.student_group.clone(),
    }
}

fn group_for_role<'a>(config: &'a Config, role: &str) -> &'a str {
    match role {
        ADMIN => &config.admin_group,
        TEACHER => &config.teacher_group,
        STUDENT => &config.student_group,
        other => panic!("unknown role in test setup: {other}"),
    }
}

/// Create a test app with the given (role, email) memberships.
#[allow(dead_code)]
pub fn create_test_app(members: &[(&str, &str)]) -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let pairs: Vec<(String, &str)> = members
        .iter()
        .map(|(role, email)| (group_for_role(&config, role).to_string(), *email))
        .collect();
    let directory = DirectoryService::new_static(
        test_groups(&config),
        pairs.iter().map(|(group, email)| (group.as_str(), *email)),
    );

    create_test_app_with_directory(config, directory)
}

/// Create a test app with a caller-built directory backend.
#[allow(dead_code)]
pub fn create_test_app_with_directory(
    config: Config,
    directory: DirectoryService,
) -> (axum::Router, Arc<AppState>) {
    let identity = GoogleIdentityVerifier::new_with_static_key(
        &config,
        IDENTITY_KID,
        Algorithm::HS256,
        DecodingKey::from_secret(IDENTITY_SECRET),
    )
    .expect("static identity verifier");

    let sessions = SessionService::from_config(&config);
    let registry = UserRegistry::new_memory();
    let live_status = LiveStatusService::new(None);

    let state = Arc::new(AppState {
        config,
        registry,
        identity,
        directory,
        sessions,
        live_status,
    });

    (create_router(state.clone()), state)
}

/// Mint a Google-style ID token for the static identity verifier.
#[allow(dead_code)]
pub fn identity_token(config: &Config, email: &str) -> String {
    identity_token_with(email, &config.google_client_id, 3600)
}

/// Mint an ID token with explicit audience and expiry offset.
#[allow(dead_code)]
pub fn identity_token_with(email: &str, audience: &str, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = serde_json::json!({
        "iss": "accounts.google.com",
        "aud": audience,
        "sub": format!("sub-{email}"),
        "iat": now,
        "exp": now + exp_offset,
        "email": email,
        "email_verified": true,
        "given_name": "Test",
        "family_name": "User",
        "name": "Test User",
        "picture": "https://example.com/avatar.png",
    });

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(IDENTITY_KID.to_string());
    encode(&header, &claims, &EncodingKey::from_secret(IDENTITY_SECRET)).unwrap()
}

/// POST /auth/login with a credential; returns status and parsed body.
#[allow(dead_code)]
pub async fn login(app: &axum::Router, credential: &str) -> (StatusCode, serde_json::Value) {
    let body = serde_json::json!({ "credential": credential });
    post_json(app, "/auth/login", &body).await
}

/// POST a JSON body; returns status and parsed response body.
#[allow(dead_code)]
pub async fn post_json(
    app: &axum::Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_string(body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    (status, body_json(response).await)
}

/// POST a JSON body with a bearer token; returns status and parsed body.
#[allow(dead_code)]
pub async fn post_json_auth(
    app: &axum::Router,
    uri: &str,
    body: &serde_json::Value,
    token: &str,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(serde_json::to_string(body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    (status, body_json(response).await)
}

/// GET with a bearer token; returns status and parsed body.
#[allow(dead_code)]
pub async fn bearer_get(
    app: &axum::Router,
    uri: &str,
    token: &str,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    (status, body_json(response).await)
}

/// Parse a response body as JSON, or Null for empty bodies.
#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    }
}
