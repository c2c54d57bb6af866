// SPDX-License-Identifier: MIT

//! HTTP route handlers.

pub mod api;
pub mod auth;

use crate::AppState;
use axum::http::{header, Method};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub build_id: String,
}

/// Health check response
async fn health_check() -> Json<HealthResponse> {
    let build_id = option_env!("BUILD_ID").unwrap_or("unknown").to_string();
    Json(HealthResponse {
        status: "ok".to_string(),
        build_id,
    })
}

/// Build the complete router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer - allow requests from the frontend URL and localhost (dev)
    let frontend_url = state.config.frontend_url.clone();
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::predicate(
            move |origin: &axum::http::HeaderValue, _request_parts: &axum::http::request::Parts| {
                let origin_str = origin.to_str().unwrap_or("");
                origin_str == frontend_url
                    || origin_str.starts_with("http://localhost")
                    || origin_str.starts_with("http://127.0.0.1")
            },
        ))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/live-status", get(api::live_status))
        .merge(auth::routes());

    // Protected routes carry their role gates inside api::routes.
    let protected_routes = api::routes(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn(
            crate::middleware::security::add_security_headers,
        ))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
