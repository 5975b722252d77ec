//! Storage backends for circuit breaker state.
//!
//! The in-memory store keeps state per process and resets on restart. The
//! Redis store shares state between processes and survives restarts, using
//! three keys per provider:
//!
//! | Key | Value |
//! |-----|-------|
//! | `cb:<provider>:failures` | consecutive failure count (`INCR`) |
//! | `cb:<provider>:opened` | `"1"` for a generic open, `"entitlement"` for a plan block |
//! | `cb:<provider>:opened_at` | open time, unix milliseconds |

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{info, warn};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::Serialize;
use thiserror::Error;

const OPENED_GENERIC: &str = "1";
const OPENED_ENTITLEMENT: &str = "entitlement";

/// Connection attempts give up after this long.
pub const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised by a circuit store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Corrupt circuit state for {provider}: {message}")]
    Corrupt { provider: String, message: String },
}

/// Snapshot of one provider's circuit.
///
/// `opened_at` is set iff the failure threshold was reached or an
/// entitlement error was seen, and cleared by any success.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub entitlement_blocked: bool,
}

impl CircuitState {
    pub fn closed() -> Self {
        Self::default()
    }
}

/// Persistence for per-provider circuit state.
///
/// Implementations must make `increment_failures` atomic, and generic opens
/// must not move an existing `opened_at`.
#[async_trait]
pub trait CircuitStore: Send + Sync {
    /// Name of the backend, for logs and health output.
    fn backend(&self) -> &'static str;

    async fn load(&self, provider: &str) -> Result<CircuitState, StoreError>;

    /// Add one failure and return the new consecutive count.
    async fn increment_failures(&self, provider: &str) -> Result<u32, StoreError>;

    /// Mark the circuit open at `at`.
    ///
    /// A generic open keeps an earlier `opened_at`; an entitlement open
    /// always overwrites it and sets the entitlement flag.
    async fn open(&self, provider: &str, at: DateTime<Utc>, entitlement: bool) -> Result<(), StoreError>;

    /// Clear failures and open state.
    async fn clear(&self, provider: &str) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store. State resets when the application restarts.
#[derive(Default)]
pub struct MemoryCircuitStore {
    circuits: Mutex<HashMap<String, CircuitState>>,
}

impl MemoryCircuitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the circuits mutex, recovering from poison if necessary.
    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<String, CircuitState>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl CircuitStore for MemoryCircuitStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, provider: &str) -> Result<CircuitState, StoreError> {
        Ok(self
            .lock_circuits()
            .get(provider)
            .cloned()
            .unwrap_or_default())
    }

    async fn increment_failures(&self, provider: &str) -> Result<u32, StoreError> {
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(provider.to_string()).or_default();
        circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);
        Ok(circuit.consecutive_failures)
    }

    async fn open(&self, provider: &str, at: DateTime<Utc>, entitlement: bool) -> Result<(), StoreError> {
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(provider.to_string()).or_default();
        if entitlement {
            circuit.opened_at = Some(at);
            circuit.entitlement_blocked = true;
        } else if circuit.opened_at.is_none() {
            circuit.opened_at = Some(at);
        }
        Ok(())
    }

    async fn clear(&self, provider: &str) -> Result<(), StoreError> {
        self.lock_circuits().remove(provider);
        Ok(())
    }
}

// ============================================================================
// Redis store
// ============================================================================

/// Redis-backed store shared by every process pointing at the same server.
pub struct RedisCircuitStore {
    conn: ConnectionManager,
}

impl RedisCircuitStore {
    /// Connect to Redis, giving up after [`REDIS_CONNECT_TIMEOUT`].
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)?;

        let conn = tokio::time::timeout(REDIS_CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::ConnectTimeout(REDIS_CONNECT_TIMEOUT))??;

        info!("Circuit breaker state stored in Redis");
        Ok(Self { conn })
    }

    fn keys(provider: &str) -> (String, String, String) {
        (
            format!("cb:{}:failures", provider),
            format!("cb:{}:opened", provider),
            format!("cb:{}:opened_at", provider),
        )
    }
}

#[async_trait]
impl CircuitStore for RedisCircuitStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn load(&self, provider: &str) -> Result<CircuitState, StoreError> {
        let (failures_key, opened_key, opened_at_key) = Self::keys(provider);
        let mut conn = self.conn.clone();

        let values: Vec<Option<String>> = conn
            .mget(vec![failures_key, opened_key, opened_at_key])
            .await?;

        let corrupt = |message: String| StoreError::Corrupt {
            provider: provider.to_string(),
            message,
        };

        let failures = match values.first().cloned().flatten() {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|e| corrupt(format!("failures '{}': {}", raw, e)))?,
            None => 0,
        };
        let opened = values.get(1).cloned().flatten();
        let opened_at = match values.get(2).cloned().flatten() {
            Some(raw) => {
                let millis = raw
                    .parse::<i64>()
                    .map_err(|e| corrupt(format!("opened_at '{}': {}", raw, e)))?;
                Utc.timestamp_millis_opt(millis).single()
            }
            None => None,
        };

        Ok(CircuitState {
            consecutive_failures: failures,
            // An open marker without a timestamp is treated as closed
            opened_at: opened.as_ref().and(opened_at),
            entitlement_blocked: opened.as_deref() == Some(OPENED_ENTITLEMENT),
        })
    }

    async fn increment_failures(&self, provider: &str) -> Result<u32, StoreError> {
        let (failures_key, _, _) = Self::keys(provider);
        let mut conn = self.conn.clone();
        let count: i64 = conn.incr(&failures_key, 1).await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn open(&self, provider: &str, at: DateTime<Utc>, entitlement: bool) -> Result<(), StoreError> {
        let (_, opened_key, opened_at_key) = Self::keys(provider);
        let mut conn = self.conn.clone();
        let millis = at.timestamp_millis();

        if entitlement {
            let _: () = redis::pipe()
                .atomic()
                .set(&opened_key, OPENED_ENTITLEMENT)
                .ignore()
                .set(&opened_at_key, millis)
                .ignore()
                .query_async(&mut conn)
                .await?;
        } else {
            // Concurrent openers must not move an existing open time
            let _: () = redis::pipe()
                .atomic()
                .set_nx(&opened_key, OPENED_GENERIC)
                .ignore()
                .set_nx(&opened_at_key, millis)
                .ignore()
                .query_async(&mut conn)
                .await?;
        }
        Ok(())
    }

    async fn clear(&self, provider: &str) -> Result<(), StoreError> {
        let (failures_key, opened_key, opened_at_key) = Self::keys(provider);
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(vec![failures_key, opened_key, opened_at_key]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_counts_and_clears() {
        let store = MemoryCircuitStore::new();
        assert_eq!(store.increment_failures("A").await.unwrap(), 1);
        assert_eq!(store.increment_failures("A").await.unwrap(), 2);
        assert_eq!(store.load("A").await.unwrap().consecutive_failures, 2);

        store.clear("A").await.unwrap();
        assert_eq!(store.load("A").await.unwrap(), CircuitState::closed());
    }

    #[tokio::test]
    async fn test_generic_open_keeps_first_timestamp() {
        let store = MemoryCircuitStore::new();
        let first = Utc::now() - chrono::Duration::seconds(30);

        store.open("A", first, false).await.unwrap();
        store.open("A", Utc::now(), false).await.unwrap();

        assert_eq!(store.load("A").await.unwrap().opened_at, Some(first));
    }

    #[tokio::test]
    async fn test_entitlement_open_overwrites_timestamp() {
        let store = MemoryCircuitStore::new();
        let first = Utc::now() - chrono::Duration::seconds(30);
        let later = Utc::now();

        store.open("A", first, false).await.unwrap();
        store.open("A", later, true).await.unwrap();

        let state = store.load("A").await.unwrap();
        assert_eq!(state.opened_at, Some(later));
        assert!(state.entitlement_blocked);
    }

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_store_round_trip() {
        let store = RedisCircuitStore::connect(&redis_url()).await.unwrap();
        let provider = "TEST_REDIS_STORE";
        store.clear(provider).await.unwrap();

        assert_eq!(store.increment_failures(provider).await.unwrap(), 1);
        assert_eq!(store.increment_failures(provider).await.unwrap(), 2);

        let opened_at = Utc.timestamp_millis_opt(1_704_067_200_000).single().unwrap();
        store.open(provider, opened_at, false).await.unwrap();
        store.open(provider, Utc::now(), false).await.unwrap();

        let state = store.load(provider).await.unwrap();
        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(state.opened_at, Some(opened_at));
        assert!(!state.entitlement_blocked);

        store.open(provider, Utc::now(), true).await.unwrap();
        assert!(store.load(provider).await.unwrap().entitlement_blocked);

        store.clear(provider).await.unwrap();
        assert_eq!(store.load(provider).await.unwrap(), CircuitState::closed());
    }

    #[tokio::test]
    async fn test_redis_connect_fails_fast_on_bad_url() {
        let result = RedisCircuitStore::connect("not-a-redis-url").await;
        assert!(result.is_err());
    }
}
