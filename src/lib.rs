// SPDX-License-Identifier: MIT

//! Lab Portal API: backend for a university lab's web portal.
//!
//! Handles Google sign-in, role resolution via Workspace group membership,
//! stateless JWT sessions, and the authenticated API surface built on top.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::UserRegistry;
use services::{DirectoryService, GoogleIdentityVerifier, LiveStatusService, SessionService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub registry: UserRegistry,
    pub identity: GoogleIdentityVerifier,
    pub directory: DirectoryService,
    pub sessions: SessionService,
    pub live_status: LiveStatusService,
}
