// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.
//!
//! Secrets (JWT signing key, service account key path) arrive through the
//! environment; in production Cloud Run injects them via secret bindings.

use std::env;

const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 60 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Google OAuth client ID (the audience of incoming ID tokens)
    pub google_client_id: String,
    /// Workspace group address granting admin role
    pub admin_group: String,
    /// Workspace group address granting teacher role
    pub teacher_group: String,
    /// Workspace group address granting student role
    pub student_group: String,
    /// Workspace admin to impersonate for Directory API calls
    pub directory_subject: String,
    /// Path to the service account key JSON
    pub service_account_file: String,
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,

    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Access token lifetime in seconds
    pub access_token_ttl_secs: u64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl_secs: u64,

    /// YouTube Data API key for the live-status check (optional)
    pub youtube_api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_ID"))?,
            admin_group: env::var("GOOGLE_ADMIN_GROUP")
                .map_err(|_| ConfigError::Missing("GOOGLE_ADMIN_GROUP"))?,
            teacher_group: env::var("GOOGLE_TEACHERS_GROUP")
                .map_err(|_| ConfigError::Missing("GOOGLE_TEACHERS_GROUP"))?,
            student_group: env::var("GOOGLE_STUDENTS_GROUP")
                .map_err(|_| ConfigError::Missing("GOOGLE_STUDENTS_GROUP"))?,
            directory_subject: env::var("GOOGLE_ADMIN_EMAIL")
                .map_err(|_| ConfigError::Missing("GOOGLE_ADMIN_EMAIL"))?,
            service_account_file: env::var("GOOGLE_SERVICE_ACCOUNT_FILE")
                .unwrap_or_else(|_| "service_account.json".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            access_token_ttl_secs: parse_ttl("ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl_secs: parse_ttl(
                "REFRESH_TOKEN_TTL_SECS",
                DEFAULT_REFRESH_TOKEN_TTL_SECS,
            ),

            youtube_api_key: env::var("YOUTUBE_API_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }

    /// Default config for tests.
    pub fn test_default() -> Self {
        Self {
            google_client_id: "test-client-id.apps.googleusercontent.com".to_string(),
            admin_group: "lab-admins@example.edu".to_string(),
            teacher_group: "lab-teachers@example.edu".to_string(),
            student_group: "lab-students@example.edu".to_string(),
            directory_subject: "workspace-admin@example.edu".to_string(),
            service_account_file: "service_account.json".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!!".to_vec(),
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_token_ttl_secs: DEFAULT_REFRESH_TOKEN_TTL_SECS,
            youtube_api_key: None,
        }
    }
}

fn parse_ttl(var: &str, default: u64) -> u64 {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("GOOGLE_CLIENT_ID", "test-id");
        env::set_var("GOOGLE_ADMIN_GROUP", "admins@example.edu");
        env::set_var("GOOGLE_TEACHERS_GROUP", "teachers@example.edu");
        env::set_var("GOOGLE_STUDENTS_GROUP", "students@example.edu");
        env::set_var("GOOGLE_ADMIN_EMAIL", "admin@example.edu");
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!!");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.google_client_id, "test-id");
        assert_eq!(config.admin_group, "admins@example.edu");
        assert_eq!(config.port, 8080);
        assert_eq!(config.access_token_ttl_secs, DEFAULT_ACCESS_TOKEN_TTL_SECS);
    }

    #[test]
    fn test_default_has_distinct_groups() {
        let config = Config::test_default();
        assert_ne!(config.admin_group, config.student_group);
        assert_ne!(config.admin_group, config.teacher_group);
    }
}
