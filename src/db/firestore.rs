// SPDX-License-Identifier: MIT

//! User registry over Firestore.
//!
//! Users are stored one document per user, keyed by email. Keying by email is
//! the uniqueness enforcement: two concurrent logins for the same address
//! write the same document, so a race resolves to one row with the second
//! writer's role flags applied.

use crate::db::collections;
use crate::error::AppError;
use crate::models::{RoleFlags, User};
use dashmap::DashMap;
use std::sync::Arc;

/// Profile fields applied on every login.
#[derive(Debug, Clone)]
pub struct UserUpsert {
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub picture: Option<String>,
    pub google_sub: Option<String>,
}

#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    /// In-memory store for offline tests and local development.
    Memory(Arc<DashMap<String, User>>),
}

/// Persistent store of application users.
#[derive(Clone)]
pub struct UserRegistry {
    backend: Backend,
}

impl UserRegistry {
    /// Connect to Firestore.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn connect(project_id: &str) -> Result<Self, AppError> {
        // With the emulator, use an unauthenticated connection to avoid
        // local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::connect_emulator(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    async fn connect_emulator(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create an in-memory registry (offline mode, for tests).
    pub fn new_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(DashMap::new())),
        }
    }

    /// Look up a user by email.
    pub async fn find_user(&self, email: &str) -> Result<Option<User>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::USERS)
                .obj()
                .one(email)
                .await
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(map) => Ok(map.get(email).map(|entry| entry.value().clone())),
        }
    }

    /// Look up an active user by email. Authorization reads use this so a
    /// deactivated user is denied even while holding an unexpired token.
    pub async fn find_active(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.find_user(email).await?.filter(|user| user.is_active))
    }

    /// Create-or-update a user on login.
    ///
    /// Role flags and profile fields are overwritten with the latest values;
    /// email and created_at are never touched after creation.
    pub async fn upsert_user(
        &self,
        profile: &UserUpsert,
        roles: RoleFlags,
    ) -> Result<User, AppError> {
        let existing = self.find_user(&profile.email).await?;
        let created = existing.is_none();

        let user = match existing {
            Some(current) => User {
                given_name: profile.given_name.clone(),
                family_name: profile.family_name.clone(),
                picture: profile.picture.clone().or(current.picture),
                google_sub: current.google_sub.or_else(|| profile.google_sub.clone()),
                is_admin: roles.is_admin,
                is_teacher: roles.is_teacher,
                is_student: roles.is_student,
                ..current
            },
            None => User {
                email: profile.email.clone(),
                given_name: profile.given_name.clone(),
                family_name: profile.family_name.clone(),
                picture: profile.picture.clone(),
                google_sub: profile.google_sub.clone(),
                is_admin: roles.is_admin,
                is_teacher: roles.is_teacher,
                is_student: roles.is_student,
                is_active: true,
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        };

        self.write_user(&user).await?;

        tracing::info!(
            email = %user.email,
            created,
            is_admin = user.is_admin,
            is_teacher = user.is_teacher,
            is_student = user.is_student,
            "User upserted"
        );

        Ok(user)
    }

    /// Mark a user inactive. The flow never hard-deletes users.
    pub async fn deactivate_user(&self, email: &str) -> Result<(), AppError> {
        let Some(mut user) = self.find_user(email).await? else {
            return Err(AppError::NotFound(format!("User {} not found", email)));
        };

        user.is_active = false;
        self.write_user(&user).await?;

        tracing::info!(email = %email, "User deactivated");
        Ok(())
    }

    async fn write_user(&self, user: &User) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::USERS)
                    .document_id(&user.email)
                    .object(user)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(map) => {
                map.insert(user.email.clone(), user.clone());
                Ok(())
            }
        }
    }
}
