// SPDX-License-Identifier: MIT

//! Stateless session tokens.
//!
//! Issues an HS256 access/refresh pair at login. The access token embeds the
//! role flags so protected endpoints can authorize without a directory round
//! trip; the refresh token carries the same snapshot and can only mint new
//! access tokens. Role claims stay frozen until the next full login.

use crate::config::Config;
use crate::error::AppError;
use crate::models::{RoleFlags, User};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Distinguishes the two token kinds so one can never stand in for the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenUse {
    Access,
    Refresh,
}

/// Session token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user email)
    pub sub: String,
    pub token_use: TokenUse,
    pub is_admin: bool,
    pub is_teacher: bool,
    pub is_student: bool,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
}

impl SessionClaims {
    pub fn roles(&self) -> RoleFlags {
        RoleFlags {
            is_admin: self.is_admin,
            is_teacher: self.is_teacher,
            is_student: self.is_student,
        }
    }
}

/// Access/refresh pair returned from login.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Mints and verifies session tokens.
pub struct SessionService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionService {
    pub fn new(signing_key: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(signing_key),
            decoding_key: DecodingKey::from_secret(signing_key),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_signing_key,
            Duration::from_secs(config.access_token_ttl_secs),
            Duration::from_secs(config.refresh_token_ttl_secs),
        )
    }

    /// Issue a fresh token pair for a user, snapshotting their role flags.
    pub fn issue(&self, user: &User) -> Result<TokenPair, AppError> {
        let roles = user.roles();
        Ok(TokenPair {
            access_token: self.mint(&user.email, roles, TokenUse::Access, self.access_ttl)?,
            refresh_token: self.mint(&user.email, roles, TokenUse::Refresh, self.refresh_ttl)?,
        })
    }

    /// Verify an access token: signature and expiry only, no server state.
    pub fn verify_access(&self, token: &str) -> Result<SessionClaims, AppError> {
        self.verify(token, TokenUse::Access)
    }

    /// Exchange a valid refresh token for a new access token carrying the
    /// same role snapshot.
    pub fn refresh(&self, refresh_token: &str) -> Result<String, AppError> {
        let claims = self.verify(refresh_token, TokenUse::Refresh)?;
        self.mint(&claims.sub, claims.roles(), TokenUse::Access, self.access_ttl)
    }

    fn verify(&self, token: &str, expected_use: TokenUse) -> Result<SessionClaims, AppError> {
        let validation = Validation::new(Algorithm::HS256);

        let token_data = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| AppError::InvalidToken)?;

        if token_data.claims.token_use != expected_use {
            return Err(AppError::InvalidToken);
        }

        Ok(token_data.claims)
    }

    fn mint(
        &self,
        sub: &str,
        roles: RoleFlags,
        token_use: TokenUse,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("system time error: {e}")))?
            .as_secs() as usize;

        let claims = SessionClaims {
            sub: sub.to_string(),
            token_use,
            is_admin: roles.is_admin,
            is_teacher: roles.is_teacher,
            is_student: roles.is_student,
            iat: now,
            exp: now + ttl.as_secs() as usize,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT encoding failed: {e}")))
    }
}
