// SPDX-License-Identifier: MIT

//! Workspace group membership resolver.
//!
//! Role resolution asks the Admin SDK Directory API whether the verified
//! email belongs to the admin, teacher, and student groups. The three checks
//! are independent: a failure or timeout on one resolves that role to false
//! and never aborts the others, so a directory outage degrades to "fewer
//! roles granted" instead of failing the login.
//!
//! Admin group management (list/add/remove members) goes through the same
//! client but surfaces errors, since those calls are explicit admin actions.

use crate::cache::TtlCache;
use crate::models::RoleFlags;
use dashmap::DashMap;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

const ADMIN_SDK_BASE_URL: &str = "https://admin.googleapis.com";
const DIRECTORY_SCOPE: &str = "https://www.googleapis.com/auth/admin.directory.group";
const HTTP_TIMEOUT: Duration = Duration::from_secs(8);
const MEMBERSHIP_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const ASSERTION_LIFETIME_SECS: u64 = 3600;
// Refresh the cached access token a minute early so in-flight calls never
// race its expiry.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;
const TOKEN_CACHE_KEY: &str = "directory";

/// Directory service errors.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory auth failed: {0}")]
    Auth(String),
    #[error("directory API error: {0}")]
    Api(String),
    #[error("membership check timed out")]
    Timeout,
}

/// The configured role-group addresses.
#[derive(Debug, Clone)]
pub struct RoleGroups {
    pub admin: String,
    pub teacher: String,
    pub student: String,
}

/// Service account key fields needed for the JWT grant.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let key: Self = serde_json::from_str(&raw)?;
        Ok(key)
    }
}

/// Caches the short-lived Directory API access token obtained through the
/// service-account JWT grant with domain-wide delegation.
struct TokenSource {
    http: reqwest::Client,
    signing_key: EncodingKey,
    client_email: String,
    token_uri: String,
    /// Workspace admin the service account impersonates.
    subject: String,
    cached: TtlCache<String>,
    refresh_lock: Mutex<()>,
}

#[derive(Serialize)]
struct GrantAssertion<'a> {
    iss: &'a str,
    sub: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct GrantResponse {
    access_token: String,
    expires_in: u64,
}

impl TokenSource {
    fn new(key: &ServiceAccountKey, subject: &str) -> anyhow::Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid service account private key: {e}"))?;

        Ok(Self {
            http: reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?,
            signing_key,
            client_email: key.client_email.clone(),
            token_uri: key.token_uri.clone(),
            subject: subject.to_string(),
            cached: TtlCache::new(),
            refresh_lock: Mutex::new(()),
        })
    }

    async fn token(&self) -> Result<String, DirectoryError> {
        if let Some(token) = self.cached.get(TOKEN_CACHE_KEY).await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = self.cached.get(TOKEN_CACHE_KEY).await {
            return Ok(token);
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let assertion = GrantAssertion {
            iss: &self.client_email,
            sub: &self.subject,
            scope: DIRECTORY_SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let jwt = encode(
            &Header::new(Algorithm::RS256),
            &assertion,
            &self.signing_key,
        )
        .map_err(|e| DirectoryError::Auth(format!("signing grant assertion failed: {e}")))?;

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DirectoryError::Auth(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(DirectoryError::Auth(format!(
                "token endpoint returned status {}",
                response.status()
            )));
        }

        let grant: GrantResponse = response
            .json()
            .await
            .map_err(|e| DirectoryError::Auth(format!("invalid token response: {e}")))?;

        let ttl = grant
            .expires_in
            .saturating_sub(TOKEN_EXPIRY_MARGIN_SECS)
            .max(1);
        self.cached
            .insert(
                TOKEN_CACHE_KEY,
                grant.access_token.clone(),
                Duration::from_secs(ttl),
            )
            .await;

        tracing::debug!(expires_in = grant.expires_in, "Directory access token refreshed");
        Ok(grant.access_token)
    }
}

enum Backend {
    AdminSdk {
        http: reqwest::Client,
        base_url: String,
        tokens: TokenSource,
    },
    /// In-memory group membership for offline tests and local development.
    Static {
        members: DashMap<String, HashSet<String>>,
        failing_groups: HashSet<String>,
        queries: AtomicUsize,
    },
}

/// Group membership resolver and group management client.
pub struct DirectoryService {
    backend: Backend,
    groups: RoleGroups,
}

impl DirectoryService {
    /// Production backend against the Admin SDK Directory API.
    pub fn new_admin_sdk(
        key: &ServiceAccountKey,
        subject: &str,
        groups: RoleGroups,
    ) -> anyhow::Result<Self> {
        let tokens = TokenSource::new(key, subject)?;
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        tracing::info!(
            service_account = %key.client_email,
            subject = %subject,
            "Initialized Admin SDK directory backend"
        );

        Ok(Self {
            backend: Backend::AdminSdk {
                http,
                base_url: ADMIN_SDK_BASE_URL.to_string(),
                tokens,
            },
            groups,
        })
    }

    /// Static backend with fixed memberships, for tests.
    pub fn new_static<'a>(
        groups: RoleGroups,
        members: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self::new_static_with_failures(groups, members, [])
    }

    /// Static backend where membership checks against the listed groups
    /// fail, to exercise the degraded-resolution policy.
    pub fn new_static_with_failures<'a>(
        groups: RoleGroups,
        members: impl IntoIterator<Item = (&'a str, &'a str)>,
        failing_groups: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let map: DashMap<String, HashSet<String>> = DashMap::new();
        for (group, email) in members {
            map.entry(group.to_string())
                .or_default()
                .insert(email.to_string());
        }

        Self {
            backend: Backend::Static {
                members: map,
                failing_groups: failing_groups
                    .into_iter()
                    .map(|g| g.to_string())
                    .collect(),
                queries: AtomicUsize::new(0),
            },
            groups,
        }
    }

    pub fn groups(&self) -> &RoleGroups {
        &self.groups
    }

    /// Number of membership queries issued so far (static backend only).
    /// Lets tests assert that invalid credentials fail before role resolution.
    pub fn query_count(&self) -> usize {
        match &self.backend {
            Backend::Static { queries, .. } => queries.load(Ordering::SeqCst),
            Backend::AdminSdk { .. } => 0,
        }
    }

    /// Resolve role flags for an email by checking each configured group.
    ///
    /// The checks run concurrently with individual timeouts; per-group
    /// failures log and resolve to false.
    pub async fn resolve_roles(&self, email: &str) -> RoleFlags {
        let (is_admin, is_teacher, is_student) = tokio::join!(
            self.check_role(email, &self.groups.admin, "admin"),
            self.check_role(email, &self.groups.teacher, "teacher"),
            self.check_role(email, &self.groups.student, "student"),
        );

        RoleFlags {
            is_admin,
            is_teacher,
            is_student,
        }
    }

    async fn check_role(&self, email: &str, group: &str, role: &str) -> bool {
        match tokio::time::timeout(MEMBERSHIP_CHECK_TIMEOUT, self.is_member(group, email)).await {
            Ok(Ok(is_member)) => is_member,
            Ok(Err(e)) => {
                tracing::warn!(
                    email = %email,
                    group = %group,
                    role = %role,
                    error = %e,
                    "Membership check failed; resolving role to false"
                );
                false
            }
            Err(_) => {
                tracing::warn!(
                    email = %email,
                    group = %group,
                    role = %role,
                    "Membership check timed out; resolving role to false"
                );
                false
            }
        }
    }

    /// Check whether an email is a member of a group.
    pub async fn is_member(&self, group: &str, email: &str) -> Result<bool, DirectoryError> {
        match &self.backend {
            Backend::AdminSdk {
                http,
                base_url,
                tokens,
            } => {
                let token = tokens.token().await?;
                let url = format!(
                    "{}/admin/directory/v1/groups/{}/hasMember/{}",
                    base_url,
                    urlencoding::encode(group),
                    urlencoding::encode(email)
                );

                let response = http
                    .get(&url)
                    .bearer_auth(&token)
                    .send()
                    .await
                    .map_err(|e| DirectoryError::Api(format!("hasMember request failed: {e}")))?;

                // The API answers 404 for addresses outside the domain.
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Ok(false);
                }
                if !response.status().is_success() {
                    return Err(DirectoryError::Api(format!(
                        "hasMember returned status {}",
                        response.status()
                    )));
                }

                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct HasMemberResponse {
                    #[serde(default)]
                    is_member: bool,
                }

                let body: HasMemberResponse = response
                    .json()
                    .await
                    .map_err(|e| DirectoryError::Api(format!("invalid hasMember response: {e}")))?;

                Ok(body.is_member)
            }
            Backend::Static {
                members,
                failing_groups,
                queries,
            } => {
                queries.fetch_add(1, Ordering::SeqCst);
                if failing_groups.contains(group) {
                    return Err(DirectoryError::Api("simulated outage".to_string()));
                }
                Ok(members
                    .get(group)
                    .is_some_and(|emails| emails.contains(email)))
            }
        }
    }

    /// List member emails of a group (admin management).
    pub async fn list_members(&self, group: &str) -> Result<Vec<String>, DirectoryError> {
        match &self.backend {
            Backend::AdminSdk {
                http,
                base_url,
                tokens,
            } => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Member {
                    email: String,
                }

                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct MembersResponse {
                    #[serde(default)]
                    members: Vec<Member>,
                    next_page_token: Option<String>,
                }

                let token = tokens.token().await?;
                let base = format!(
                    "{}/admin/directory/v1/groups/{}/members",
                    base_url,
                    urlencoding::encode(group)
                );

                let mut emails = Vec::new();
                let mut page_token: Option<String> = None;

                loop {
                    let mut request = http.get(&base).bearer_auth(&token);
                    if let Some(ref next) = page_token {
                        request = request.query(&[("pageToken", next)]);
                    }

                    let response = request.send().await.map_err(|e| {
                        DirectoryError::Api(format!("members request failed: {e}"))
                    })?;

                    if !response.status().is_success() {
                        return Err(DirectoryError::Api(format!(
                            "members list returned status {}",
                            response.status()
                        )));
                    }

                    let body: MembersResponse = response.json().await.map_err(|e| {
                        DirectoryError::Api(format!("invalid members response: {e}"))
                    })?;

                    emails.extend(body.members.into_iter().map(|m| m.email));

                    match body.next_page_token {
                        Some(next) if !next.is_empty() => page_token = Some(next),
                        _ => break,
                    }
                }

                Ok(emails)
            }
            Backend::Static { members, .. } => {
                let mut emails: Vec<String> = members
                    .get(group)
                    .map(|set| set.iter().cloned().collect())
                    .unwrap_or_default();
                emails.sort();
                Ok(emails)
            }
        }
    }

    /// Add a member to a group (admin management).
    pub async fn add_member(&self, group: &str, email: &str) -> Result<(), DirectoryError> {
        match &self.backend {
            Backend::AdminSdk {
                http,
                base_url,
                tokens,
            } => {
                let token = tokens.token().await?;
                let url = format!(
                    "{}/admin/directory/v1/groups/{}/members",
                    base_url,
                    urlencoding::encode(group)
                );

                let response = http
                    .post(&url)
                    .bearer_auth(&token)
                    .json(&serde_json::json!({ "email": email, "role": "MEMBER" }))
                    .send()
                    .await
                    .map_err(|e| DirectoryError::Api(format!("insert request failed: {e}")))?;

                if !response.status().is_success() {
                    return Err(DirectoryError::Api(format!(
                        "member insert returned status {}",
                        response.status()
                    )));
                }

                Ok(())
            }
            Backend::Static { members, .. } => {
                members
                    .entry(group.to_string())
                    .or_default()
                    .insert(email.to_string());
                Ok(())
            }
        }
    }

    /// Remove a member from a group (admin management).
    pub async fn remove_member(&self, group: &str, email: &str) -> Result<(), DirectoryError> {
        match &self.backend {
            Backend::AdminSdk {
                http,
                base_url,
                tokens,
            } => {
                let token = tokens.token().await?;
                let url = format!(
                    "{}/admin/directory/v1/groups/{}/members/{}",
                    base_url,
                    urlencoding::encode(group),
                    urlencoding::encode(email)
                );

                let response = http
                    .delete(&url)
                    .bearer_auth(&token)
                    .send()
                    .await
                    .map_err(|e| DirectoryError::Api(format!("delete request failed: {e}")))?;

                if !response.status().is_success() {
                    return Err(DirectoryError::Api(format!(
                        "member delete returned status {}",
                        response.status()
                    )));
                }

                Ok(())
            }
            Backend::Static { members, .. } => {
                if let Some(mut set) = members.get_mut(group) {
                    set.remove(email);
                }
                Ok(())
            }
        }
    }
}
