//! Symbol-keyed response cache with a freshness TTL.
//!
//! Entries are never evicted on expiry: an expired entry is stale but is still
//! handed out as a last-resort fallback when every provider fails.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::warn;

/// A cached value and when it was fetched.
#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    pub value: T,
    /// Provider that produced the value.
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Age of the entry at `now`. Entries stamped in the future are age zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) < ttl
    }
}

/// Thread-safe cache keyed by symbol.
pub struct TtlCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry<T>>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!("Cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry<T>>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!("Cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Entry younger than the TTL, if any.
    pub fn get_fresh(&self, symbol: &str) -> Option<CacheEntry<T>> {
        let now = Utc::now();
        self.read_entries()
            .get(symbol)
            .filter(|entry| entry.is_fresh(self.ttl, now))
            .cloned()
    }

    /// Entry of any age, if any.
    pub fn get_any(&self, symbol: &str) -> Option<CacheEntry<T>> {
        self.read_entries().get(symbol).cloned()
    }

    /// Insert with an explicit fetch time, replacing any previous entry.
    pub fn insert_at(&self, symbol: &str, value: T, source: &str, fetched_at: DateTime<Utc>) {
        self.write_entries().insert(
            symbol.to_string(),
            CacheEntry {
                value,
                source: source.to_string(),
                fetched_at,
            },
        );
    }

}
