// SPDX-License-Identifier: MIT

//! Google ID token verification for the login endpoint.
//!
//! Verifies the credential the sign-in widget posts to us: RS256 signature
//! against Google's published JWKS, audience pinned to our OAuth client ID,
//! issuer and lifetime checks. Keys are discovered via the OpenID
//! configuration document and cached with the TTL Google advertises.

use crate::config::Config;
use crate::db::firestore::UserUpsert;
use anyhow::Context;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

const DISCOVERY_URL: &str = "https://accounts.google.com/.well-known/openid-configuration";
const FALLBACK_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_KEY_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Verified claims extracted from a valid Google ID token.
#[derive(Debug, Clone)]
pub struct VerifiedClaims {
    pub email: String,
    pub subject: String,
    pub given_name: String,
    pub family_name: String,
    pub name: String,
    pub picture: Option<String>,
}

impl VerifiedClaims {
    /// Profile fields the registry applies on login.
    pub fn to_upsert(&self) -> UserUpsert {
        UserUpsert {
            email: self.email.clone(),
            given_name: self.given_name.clone(),
            family_name: self.family_name.clone(),
            picture: self.picture.clone(),
            google_sub: Some(self.subject.clone()),
        }
    }
}

/// Identity verification error categories.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    /// The credential is malformed, unsigned, expired, or for the wrong
    /// audience. The caller must not trust any of its claims.
    #[error("invalid credential: {0}")]
    Invalid(String),
    /// The trust anchor could not be fetched; the login attempt fails as a
    /// whole rather than proceeding without verification.
    #[error("identity provider unavailable: {0}")]
    Transient(String),
}

enum VerifierMode {
    Google,
    /// Fixed key and algorithm for deterministic tests.
    StaticKey {
        kid: String,
        alg: Algorithm,
        decoding_key: Arc<DecodingKey>,
    },
}

#[derive(Clone)]
struct DiscoveryCacheEntry {
    jwks_uri: String,
    expires_at: Instant,
}

#[derive(Clone)]
struct JwksCacheEntry {
    keys_by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Verifier for Google-issued ID tokens presented at login.
pub struct GoogleIdentityVerifier {
    http_client: reqwest::Client,
    expected_audience: String,
    mode: VerifierMode,
    discovery_cache: RwLock<Option<DiscoveryCacheEntry>>,
    jwks_cache: RwLock<Option<JwksCacheEntry>>,
    refresh_lock: Mutex<()>,
}

impl GoogleIdentityVerifier {
    /// Create a production verifier that discovers and caches Google's JWKS.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed building identity HTTP client")?;

        tracing::info!(
            audience = %config.google_client_id,
            "Initialized Google identity verifier"
        );

        Ok(Self {
            http_client,
            expected_audience: config.google_client_id.clone(),
            mode: VerifierMode::Google,
            discovery_cache: RwLock::new(None),
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Create a verifier with a fixed key, for deterministic tests.
    pub fn new_with_static_key(
        config: &Config,
        kid: impl Into<String>,
        alg: Algorithm,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static identity kid must not be empty");
        }

        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed building identity HTTP client")?;

        Ok(Self {
            http_client,
            expected_audience: config.google_client_id.clone(),
            mode: VerifierMode::StaticKey {
                kid,
                alg,
                decoding_key: Arc::new(decoding_key),
            },
            discovery_cache: RwLock::new(None),
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Verify a raw ID token and extract its identity claims.
    pub async fn verify(&self, credential: &str) -> Result<VerifiedClaims, IdentityError> {
        let header = decode_header(credential)
            .map_err(|e| IdentityError::Invalid(format!("invalid JWT header: {e}")))?;

        let expected_alg = match &self.mode {
            VerifierMode::Google => Algorithm::RS256,
            VerifierMode::StaticKey { alg, .. } => *alg,
        };
        if header.alg != expected_alg {
            return Err(IdentityError::Invalid(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| IdentityError::Invalid("missing JWT kid".to_string()))?;

        let decoding_key = self.decoding_key_for_kid(&kid).await?;

        let mut validation = Validation::new(expected_alg);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&["https://accounts.google.com", "accounts.google.com"]);
        validation.set_audience(&[self.expected_audience.as_str()]);
        validation.leeway = CLOCK_SKEW_SECS;

        let token_data = decode::<IdTokenClaims>(credential, decoding_key.as_ref(), &validation)
            .map_err(|e| IdentityError::Invalid(format!("JWT validation failed: {e}")))?;

        let claims = token_data.claims;

        validate_iat(claims.iat)?;

        let email = claims
            .email
            .ok_or_else(|| IdentityError::Invalid("missing email claim".to_string()))?;

        match claims.email_verified {
            Some(true) => {}
            _ => {
                return Err(IdentityError::Invalid(
                    "email_verified claim is missing or false".to_string(),
                ));
            }
        }

        tracing::debug!(
            email = %email,
            subject = %claims.sub,
            "Google ID token verified"
        );

        Ok(VerifiedClaims {
            given_name: claims.given_name.unwrap_or_default(),
            family_name: claims.family_name.unwrap_or_default(),
            name: claims.name.unwrap_or_else(|| email.clone()),
            picture: claims.picture,
            subject: claims.sub,
            email,
        })
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<Arc<DecodingKey>, IdentityError> {
        if let VerifierMode::StaticKey {
            kid: static_kid,
            decoding_key,
            ..
        } = &self.mode
        {
            if kid == static_kid {
                return Ok(decoding_key.clone());
            }
            return Err(IdentityError::Invalid(format!(
                "unknown JWT kid for static verifier: {kid}"
            )));
        }

        if let Some(key) = self.lookup_cached_key(kid).await {
            return Ok(key);
        }

        // On cache miss try once from cache TTL rules, then once forced, to
        // pick up a freshly rotated key.
        for force_refresh in [false, true] {
            self.refresh_jwks(force_refresh).await?;
            if let Some(key) = self.lookup_cached_key(kid).await {
                return Ok(key);
            }
        }

        Err(IdentityError::Invalid(format!(
            "JWT kid not found in JWKS after refresh: {kid}"
        )))
    }

    async fn lookup_cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let cache = self.jwks_cache.read().await;
        let now = Instant::now();
        cache
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| entry.keys_by_kid.get(kid))
            .cloned()
    }

    async fn refresh_jwks(&self, force_refresh: bool) -> Result<(), IdentityError> {
        let _guard = self.refresh_lock.lock().await;

        if !force_refresh {
            let cache = self.jwks_cache.read().await;
            if cache
                .as_ref()
                .is_some_and(|entry| entry.expires_at > Instant::now())
            {
                return Ok(());
            }
        }

        let jwks_uri = self.resolve_jwks_uri(force_refresh).await?;

        tracing::debug!(jwks_uri = %jwks_uri, "Refreshing Google JWKS cache");

        let response = self
            .http_client
            .get(&jwks_uri)
            .send()
            .await
            .map_err(|e| IdentityError::Transient(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(IdentityError::Transient(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_KEY_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| IdentityError::Transient(format!("invalid JWKS JSON: {e}")))?;

        let mut keys_by_kid: HashMap<String, Arc<DecodingKey>> = HashMap::new();

        for jwk in jwks.keys {
            if jwk.kty != "RSA" || jwk.kid.trim().is_empty() {
                continue;
            }
            if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
                continue;
            }
            if jwk.use_.as_deref().is_some_and(|use_| use_ != "sig") {
                continue;
            }

            match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => {
                    keys_by_kid.insert(jwk.kid, Arc::new(key));
                }
                Err(e) => {
                    tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
                }
            }
        }

        if keys_by_kid.is_empty() {
            return Err(IdentityError::Transient(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        *self.jwks_cache.write().await = Some(JwksCacheEntry {
            keys_by_kid,
            expires_at: Instant::now() + ttl,
        });

        tracing::debug!(ttl_secs = ttl.as_secs(), "Google JWKS cache refreshed");
        Ok(())
    }

    async fn resolve_jwks_uri(&self, force_refresh: bool) -> Result<String, IdentityError> {
        if !force_refresh {
            let cache = self.discovery_cache.read().await;
            if let Some(entry) = cache
                .as_ref()
                .filter(|entry| entry.expires_at > Instant::now())
            {
                return Ok(entry.jwks_uri.clone());
            }
        }

        let cached_jwks_uri = self
            .discovery_cache
            .read()
            .await
            .as_ref()
            .map(|entry| entry.jwks_uri.clone());

        match self.http_client.get(DISCOVERY_URL).send().await {
            Ok(resp) if resp.status().is_success() => {
                let ttl = cache_ttl_from_headers(resp.headers(), DEFAULT_KEY_TTL);
                let discovery: OpenIdConfig = resp.json().await.map_err(|e| {
                    IdentityError::Transient(format!("invalid discovery JSON: {e}"))
                })?;

                *self.discovery_cache.write().await = Some(DiscoveryCacheEntry {
                    jwks_uri: discovery.jwks_uri.clone(),
                    expires_at: Instant::now() + ttl,
                });

                Ok(discovery.jwks_uri)
            }
            Ok(resp) => {
                tracing::warn!(
                    status = %resp.status(),
                    "OIDC discovery returned non-success status; using fallback JWKS URI"
                );
                Ok(cached_jwks_uri.unwrap_or_else(|| FALLBACK_JWKS_URL.to_string()))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "OIDC discovery request failed; using fallback JWKS URI"
                );
                Ok(cached_jwks_uri.unwrap_or_else(|| FALLBACK_JWKS_URL.to_string()))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenIdConfig {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

/// Claims of a Google-issued ID token.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[allow(dead_code)]
    iss: String,
    #[allow(dead_code)]
    aud: String,
    sub: String,
    #[allow(dead_code)]
    exp: usize,
    iat: Option<usize>,
    email: Option<String>,
    email_verified: Option<bool>,
    given_name: Option<String>,
    family_name: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

fn validate_iat(iat: Option<usize>) -> Result<(), IdentityError> {
    let now = now_unix_secs();

    let Some(iat) = iat else {
        return Err(IdentityError::Invalid("missing iat claim".to_string()));
    };

    if iat as u64 > now + CLOCK_SKEW_SECS {
        return Err(IdentityError::Invalid(
            "iat claim is in the future".to_string(),
        ));
    }

    Ok(())
}

fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    for directive in value.split(',') {
        let directive = directive.trim();

        if let Some(raw) = directive.strip_prefix("max-age=") {
            let raw = raw.trim_matches('"');
            if let Ok(seconds) = raw.parse::<u64>() {
                return Some(seconds);
            }
        }
    }

    None
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    const TEST_KID: &str = "test-kid";
    const TEST_SECRET: &[u8] = b"identity-test-secret";

    #[derive(Serialize)]
    struct TestClaims {
        iss: String,
        aud: String,
        sub: String,
        exp: usize,
        iat: usize,
        email: String,
        email_verified: bool,
        given_name: String,
        family_name: String,
        name: String,
    }

    fn test_verifier() -> GoogleIdentityVerifier {
        let config = Config::test_default();
        GoogleIdentityVerifier::new_with_static_key(
            &config,
            TEST_KID,
            Algorithm::HS256,
            DecodingKey::from_secret(TEST_SECRET),
        )
        .unwrap()
    }

    fn claims_for(email: &str, aud: &str, exp_offset: i64) -> TestClaims {
        let now = now_unix_secs() as i64;
        TestClaims {
            iss: "accounts.google.com".to_string(),
            aud: aud.to_string(),
            sub: "subject-1".to_string(),
            exp: (now + exp_offset) as usize,
            iat: now as usize,
            email: email.to_string(),
            email_verified: true,
            given_name: "Ada".to_string(),
            family_name: "Lovelace".to_string(),
            name: "Ada Lovelace".to_string(),
        }
    }

    fn sign(claims: &TestClaims) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(TEST_KID.to_string());
        encode(&header, claims, &EncodingKey::from_secret(TEST_SECRET)).unwrap()
    }

    #[tokio::test]
    async fn valid_token_yields_claims() {
        let verifier = test_verifier();
        let config = Config::test_default();
        let token = sign(&claims_for("a@x.edu", &config.google_client_id, 3600));

        let verified = verifier.verify(&token).await.unwrap();
        assert_eq!(verified.email, "a@x.edu");
        assert_eq!(verified.subject, "subject-1");
        assert_eq!(verified.given_name, "Ada");
    }

    #[tokio::test]
    async fn wrong_audience_is_invalid() {
        let verifier = test_verifier();
        let token = sign(&claims_for("a@x.edu", "other-client", 3600));

        assert!(matches!(
            verifier.verify(&token).await,
            Err(IdentityError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn expired_token_is_invalid() {
        let verifier = test_verifier();
        let config = Config::test_default();
        let token = sign(&claims_for("a@x.edu", &config.google_client_id, -3600));

        assert!(matches!(
            verifier.verify(&token).await,
            Err(IdentityError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn unverified_email_is_invalid() {
        let verifier = test_verifier();
        let config = Config::test_default();
        let mut claims = claims_for("a@x.edu", &config.google_client_id, 3600);
        claims.email_verified = false;
        let token = sign(&claims);

        assert!(matches!(
            verifier.verify(&token).await,
            Err(IdentityError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn garbage_credential_is_invalid() {
        let verifier = test_verifier();
        assert!(matches!(
            verifier.verify("not.a.jwt").await,
            Err(IdentityError::Invalid(_))
        ));
    }

    #[test]
    fn parse_cache_control_max_age_valid() {
        assert_eq!(
            parse_cache_control_max_age("public, max-age=3600"),
            Some(3600)
        );
        assert_eq!(parse_cache_control_max_age("max-age=\"120\""), Some(120));
    }

    #[test]
    fn parse_cache_control_max_age_invalid() {
        assert_eq!(parse_cache_control_max_age("public, immutable"), None);
        assert_eq!(parse_cache_control_max_age("max-age=abc"), None);
        assert_eq!(parse_cache_control_max_age(""), None);
    }

    #[test]
    fn iat_in_future_rejected() {
        let future = (now_unix_secs() + 600) as usize;
        assert!(validate_iat(Some(future)).is_err());
        assert!(validate_iat(None).is_err());
        assert!(validate_iat(Some(now_unix_secs() as usize)).is_ok());
    }
}
