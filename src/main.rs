// SPDX-License-Identifier: MIT

//! Lab Portal API Server
//!
//! Backend for the lab's web portal: Google sign-in with Workspace
//! group-based roles, stateless JWT sessions, and the authenticated API.

use lab_portal_api::{
    config::Config,
    db::UserRegistry,
    services::{
        DirectoryService, GoogleIdentityVerifier, LiveStatusService, RoleGroups,
        ServiceAccountKey, SessionService,
    },
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Lab Portal API");

    // Connect the user registry
    let registry = UserRegistry::connect(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Identity verification (Google ID tokens)
    let identity =
        GoogleIdentityVerifier::new(&config).expect("Failed to initialize identity verifier");

    // Directory backend for role resolution and group management
    let service_account = ServiceAccountKey::from_file(&config.service_account_file)
        .expect("Failed to load service account key");
    let directory = DirectoryService::new_admin_sdk(
        &service_account,
        &config.directory_subject,
        RoleGroups {
            admin: config.admin_group.clone(),
            teacher: config.teacher_group.clone(),
            student: config.student_group.clone(),
        },
    )
    .expect("Failed to initialize directory service");

    // Session tokens
    let sessions = SessionService::from_config(&config);

    // YouTube live-status check (degrades to "offline" without an API key)
    let live_status = LiveStatusService::new(config.youtube_api_key.clone());
    if config.youtube_api_key.is_none() {
        tracing::warn!("YOUTUBE_API_KEY not set; live-status will report offline");
    }

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        registry,
        identity,
        directory,
        sessions,
        live_status,
    });

    // Build router
    let app = lab_portal_api::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lab_portal_api=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
