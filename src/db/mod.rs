// SPDX-License-Identifier: MIT

//! Database layer (Firestore).

pub mod firestore;

pub use firestore::UserRegistry;

/// Collection names as constants.
pub mod collections {
    /// User documents, keyed by email.
    pub const USERS: &str = "users";
}
