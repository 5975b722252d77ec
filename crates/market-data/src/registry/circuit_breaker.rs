//! Per-provider circuit breaker for fault tolerance.
//!
//! Implements the circuit breaker pattern to prevent hammering a provider
//! that is failing:
//!
//! - **Closed**: Normal operation, requests are allowed through and
//!   consecutive failures are counted.
//! - **Open**: The failure threshold was reached (or the provider refused us
//!   for entitlement reasons). Requests are blocked until the disable
//!   duration has elapsed.
//!
//! Once the disable duration elapses the next `allow_request` clears the
//! circuit and lets the call through, so later failures count from zero.
//! Entitlement blocks use a much longer disable duration since plan
//! restrictions do not clear on their own.
//!
//! State lives in a [`CircuitStore`]: in memory by default, or in Redis so
//! several processes share one view. Store failures never block traffic: the
//! breaker logs them and fails open.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use super::store::{CircuitState, CircuitStore, MemoryCircuitStore, RedisCircuitStore};
use crate::errors::{MarketDataError, RetryClass};

/// Default number of consecutive failures before opening the circuit.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default time a circuit stays open after transient failures.
pub const DEFAULT_DISABLE_DURATION: Duration = Duration::from_secs(60);

/// Default time a circuit stays open after an entitlement failure.
pub const DEFAULT_ENTITLEMENT_DISABLE_DURATION: Duration = Duration::from_secs(60 * 60);

/// Invalid circuit breaker configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BreakerConfigError {
    #[error("failure threshold must be at least 1")]
    ZeroThreshold,

    #[error("entitlement disable ({entitlement:?}) must be longer than the generic disable ({generic:?})")]
    EntitlementNotLonger {
        generic: Duration,
        entitlement: Duration,
    },
}

/// Circuit breaker configuration.
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long a circuit opened by failures stays open.
    pub disable_duration: Duration,
    /// How long a circuit opened by an entitlement error stays open.
    pub entitlement_disable_duration: Duration,
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), BreakerConfigError> {
        if self.failure_threshold == 0 {
            return Err(BreakerConfigError::ZeroThreshold);
        }
        if self.entitlement_disable_duration <= self.disable_duration {
            return Err(BreakerConfigError::EntitlementNotLonger {
                generic: self.disable_duration,
                entitlement: self.entitlement_disable_duration,
            });
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            disable_duration: DEFAULT_DISABLE_DURATION,
            entitlement_disable_duration: DEFAULT_ENTITLEMENT_DISABLE_DURATION,
        }
    }
}

/// Health view of one provider's circuit.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitMetrics {
    pub provider: String,
    pub open: bool,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub entitlement_blocked: bool,
    /// Time left before the circuit can close, when open.
    pub reopens_in_secs: Option<u64>,
    pub backend: &'static str,
}

/// Per-provider circuit breaker.
pub struct CircuitBreaker {
    store: Arc<dyn CircuitStore>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create an in-memory circuit breaker with default settings.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryCircuitStore::new()),
            config: CircuitBreakerConfig::default(),
        }
    }

    /// Create an in-memory circuit breaker with custom configuration.
    pub fn with_config(config: CircuitBreakerConfig) -> Result<Self, BreakerConfigError> {
        Self::with_store(config, Arc::new(MemoryCircuitStore::new()))
    }

    /// Create a circuit breaker over an explicit store.
    pub fn with_store(
        config: CircuitBreakerConfig,
        store: Arc<dyn CircuitStore>,
    ) -> Result<Self, BreakerConfigError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Build a breaker backed by Redis when `redis_url` is given and reachable,
    /// otherwise by memory.
    ///
    /// Connection problems are logged and never returned.
    pub async fn connect(
        config: CircuitBreakerConfig,
        redis_url: Option<&str>,
    ) -> Result<Self, BreakerConfigError> {
        config.validate()?;

        let store: Arc<dyn CircuitStore> = match redis_url {
            Some(url) => match RedisCircuitStore::connect(url).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(
                        "Circuit breaker: Redis unavailable ({}), falling back to in-memory state",
                        e
                    );
                    Arc::new(MemoryCircuitStore::new())
                }
            },
            None => Arc::new(MemoryCircuitStore::new()),
        };

        Ok(Self { store, config })
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Name of the state backend in use ("memory" or "redis").
    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    fn disable_duration_for(&self, state: &CircuitState) -> Duration {
        if state.entitlement_blocked {
            self.config.entitlement_disable_duration
        } else {
            self.config.disable_duration
        }
    }

    /// Remaining open time, or `None` when the circuit is closed or expired.
    fn remaining_open(&self, state: &CircuitState, now: DateTime<Utc>) -> Option<Duration> {
        let opened_at = state.opened_at?;
        let elapsed = now
            .signed_duration_since(opened_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.disable_duration_for(state).checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    async fn load(&self, provider: &str) -> Option<CircuitState> {
        match self.store.load(provider).await {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Circuit breaker: failed to load state for '{}': {}", provider, e);
                None
            }
        }
    }

    /// Check if a request to the provider may go ahead.
    ///
    /// Returns false while the circuit is open. Once the disable duration has
    /// elapsed the circuit is cleared and the request allowed.
    pub async fn allow_request(&self, provider: &str) -> bool {
        let Some(state) = self.load(provider).await else {
            // Fail open
            return true;
        };

        if state.opened_at.is_none() {
            return true;
        }

        if self.remaining_open(&state, Utc::now()).is_some() {
            debug!("Circuit breaker: '{}' is open, skipping", provider);
            return false;
        }

        info!(
            "Circuit breaker: disable period for '{}' elapsed, closing circuit",
            provider
        );
        if let Err(e) = self.store.clear(provider).await {
            warn!("Circuit breaker: failed to clear '{}': {}", provider, e);
        }
        true
    }

    /// Record a transient failure. Opens the circuit at the threshold.
    pub async fn record_failure(&self, provider: &str) {
        let failures = match self.store.increment_failures(provider).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Circuit breaker: failed to record failure for '{}': {}", provider, e);
                return;
            }
        };

        if failures >= self.config.failure_threshold {
            info!(
                "Circuit breaker: opening circuit for '{}' after {} failures",
                provider, failures
            );
            if let Err(e) = self.store.open(provider, Utc::now(), false).await {
                warn!("Circuit breaker: failed to open '{}': {}", provider, e);
            }
        } else {
            debug!(
                "Circuit breaker: failure for '{}' ({}/{})",
                provider, failures, self.config.failure_threshold
            );
        }
    }

    /// Record an entitlement failure. Opens the circuit immediately with the
    /// long disable duration.
    pub async fn record_entitlement_failure(&self, provider: &str) {
        if let Err(e) = self.store.increment_failures(provider).await {
            warn!("Circuit breaker: failed to record failure for '{}': {}", provider, e);
        }

        warn!(
            "Circuit breaker: '{}' refused the request for entitlement reasons, disabling for {:?}",
            provider, self.config.entitlement_disable_duration
        );
        if let Err(e) = self.store.open(provider, Utc::now(), true).await {
            warn!("Circuit breaker: failed to open '{}': {}", provider, e);
        }
    }

    /// Record a provider error according to its retry class.
    ///
    /// Transient errors count towards the threshold, entitlement errors open
    /// the circuit with the long disable, and anything else is ignored.
    pub async fn record_error(&self, provider: &str, error: &MarketDataError) {
        match error.retry_class() {
            RetryClass::FailoverWithPenalty => {
                warn!(
                    "Provider '{}' failed with {}, recorded circuit breaker failure",
                    provider, error
                );
                self.record_failure(provider).await;
            }
            RetryClass::Disable => self.record_entitlement_failure(provider).await,
            RetryClass::NextProvider | RetryClass::Never => {
                debug!("Provider '{}' failed with {}, no penalty", provider, error);
            }
        }
    }

    /// Record a successful request. Always clears the circuit.
    pub async fn record_success(&self, provider: &str) {
        if let Err(e) = self.store.clear(provider).await {
            warn!("Circuit breaker: failed to clear '{}': {}", provider, e);
        }
    }

    /// Whether the circuit is currently open. Has no side effects.
    pub async fn is_open(&self, provider: &str) -> bool {
        self.load(provider)
            .await
            .and_then(|state| self.remaining_open(&state, Utc::now()))
            .is_some()
    }

    /// Get the stored state for a provider.
    pub async fn state(&self, provider: &str) -> CircuitState {
        self.load(provider).await.unwrap_or_default()
    }

    /// Reset the circuit for a provider to closed.
    pub async fn reset(&self, provider: &str) {
        info!("Circuit breaker: manually resetting circuit for '{}'", provider);
        if let Err(e) = self.store.clear(provider).await {
            warn!("Circuit breaker: failed to reset '{}': {}", provider, e);
        }
    }

    /// Get metrics for the given providers.
    pub async fn metrics(&self, providers: &[&str]) -> Vec<CircuitMetrics> {
        let now = Utc::now();
        let mut metrics = Vec::with_capacity(providers.len());
        for provider in providers {
            let state = self.state(provider).await;
            let remaining = self.remaining_open(&state, now);
            metrics.push(CircuitMetrics {
                provider: provider.to_string(),
                open: remaining.is_some(),
                consecutive_failures: state.consecutive_failures,
                opened_at: state.opened_at,
                entitlement_blocked: state.entitlement_blocked,
                reopens_in_secs: remaining.map(|d| d.as_secs()),
                backend: self.backend(),
            });
        }
        metrics
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
