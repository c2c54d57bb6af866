// SPDX-License-Identifier: MIT

//! User model for storage and API.

use serde::{Deserialize, Serialize};

/// Role flags resolved from Workspace group membership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFlags {
    pub is_admin: bool,
    pub is_teacher: bool,
    pub is_student: bool,
}

impl RoleFlags {
    /// A caller must hold at least one role to use the portal at all.
    pub fn is_authorized(&self) -> bool {
        self.is_admin || self.is_teacher || self.is_student
    }
}

/// User document stored in Firestore, keyed by email.
///
/// Using the email as the document ID is what guarantees a single row per
/// user under concurrent logins; the second writer overwrites role flags
/// (last write wins) instead of racing on row creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Email address (also the document ID)
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    /// Profile picture URL from the ID token, if shared
    pub picture: Option<String>,
    /// Google account subject ID, bound on first login
    pub google_sub: Option<String>,
    pub is_admin: bool,
    pub is_teacher: bool,
    pub is_student: bool,
    pub is_active: bool,
    /// When the user first logged in (RFC 3339)
    pub created_at: String,
}

impl User {
    pub fn roles(&self) -> RoleFlags {
        RoleFlags {
            is_admin: self.is_admin,
            is_teacher: self.is_teacher,
            is_student: self.is_student,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.given_name, self.family_name)
            .trim()
            .to_string()
    }
}

/// API-facing profile, returned from login and `/api/me`.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub is_lab_admin: bool,
    pub is_teacher: bool,
    pub is_student: bool,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            name: user.full_name(),
            picture: user.picture.clone(),
            is_lab_admin: user.is_admin,
            is_teacher: user.is_teacher,
            is_student: user.is_student,
        }
    }
}
