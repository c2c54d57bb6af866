// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod directory;
pub mod identity;
pub mod live;
pub mod session;

pub use directory::{DirectoryError, DirectoryService, RoleGroups, ServiceAccountKey};
pub use identity::{GoogleIdentityVerifier, IdentityError, VerifiedClaims};
pub use live::{LiveStatus, LiveStatusService};
pub use session::{SessionClaims, SessionService, TokenPair, TokenUse};
