// SPDX-License-Identifier: MIT

//! Middleware modules (authorization gates, security headers).

pub mod auth;
pub mod security;

pub use auth::{require_admin, require_admin_or_teacher, require_auth, CurrentUser};
