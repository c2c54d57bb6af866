// SPDX-License-Identifier: MIT

//! Small keyed TTL cache.
//!
//! Each cached value carries its own expiry; the cache is owned by the
//! component that populates it rather than living in process-global state.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Read-mostly cache mapping string keys to values with per-entry TTLs.
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get a live entry, or None if absent or expired.
    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Insert a value, replacing any previous entry for the key.
    pub async fn insert(&self, key: &str, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };

        let mut entries = self.entries.write().await;
        // Opportunistic sweep so dead keys do not accumulate.
        entries.retain(|_, e| e.expires_at > Instant::now());
        entries.insert(key.to_string(), entry);
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
