//! Sliding-window rate limiter for market data providers.
//!
//! Each provider gets a rolling window of call timestamps. A call is allowed
//! while the number of calls recorded inside the window is below the ceiling.
//! Only successful calls are recorded, so failures never consume budget.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use log::{debug, warn};

use crate::errors::MarketDataError;
use crate::provider::RateLimit;

/// Per-provider sliding-window call budget.
///
/// Windows are created on demand. Providers without an explicit
/// configuration use the default [`RateLimit`].
pub struct RateLimiter {
    /// Timestamps of recorded calls, oldest first.
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    /// Per-provider ceilings.
    limits: Mutex<HashMap<String, RateLimit>>,
    default_limit: RateLimit,
}

impl RateLimiter {
    /// Create a new rate limiter with default settings.
    pub fn new() -> Self {
        Self::with_default(RateLimit::default())
    }

    pub fn with_default(default_limit: RateLimit) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            limits: Mutex::new(HashMap::new()),
            default_limit,
        }
    }

    /// Lock the windows mutex, recovering from poison if necessary.
    ///
    /// The worst case after a poisoned lock is a slightly wrong count.
    fn lock_windows(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.windows.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter windows mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_limits(&self) -> MutexGuard<'_, HashMap<String, RateLimit>> {
        self.limits.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter limits mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure the ceiling for a specific provider.
    pub fn configure(&self, provider: &str, limit: RateLimit) {
        debug!(
            "Rate limiter: '{}' allows {} calls per {:?}",
            provider, limit.requests_per_window, limit.window
        );
        self.lock_limits().insert(provider.to_string(), limit);
    }

    fn limit_for(&self, provider: &str) -> RateLimit {
        self.lock_limits()
            .get(provider)
            .cloned()
            .unwrap_or_else(|| self.default_limit.clone())
    }

    /// Drop timestamps that have left the window and return the live count.
    fn prune(window: &mut VecDeque<Instant>, limit: &RateLimit, now: Instant) -> usize {
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= limit.window {
                window.pop_front();
            } else {
                break;
            }
        }
        window.len()
    }

    /// Fail with `RateLimitExceeded` when the provider's budget is spent.
    pub fn check(&self, provider: &str) -> Result<(), MarketDataError> {
        let limit = self.limit_for(provider);
        let mut windows = self.lock_windows();
        let window = windows.entry(provider.to_string()).or_default();

        let used = Self::prune(window, &limit, Instant::now());
        if used >= limit.requests_per_window as usize {
            debug!(
                "Rate limiter: '{}' exhausted ({}/{})",
                provider, used, limit.requests_per_window
            );
            return Err(MarketDataError::RateLimitExceeded {
                provider: provider.to_string(),
            });
        }
        Ok(())
    }

    /// Record a successful call against the provider's budget.
    pub fn increment(&self, provider: &str) {
        self.lock_windows()
            .entry(provider.to_string())
            .or_default()
            .push_back(Instant::now());
    }

    /// Calls still available in the current window.
    pub fn remaining(&self, provider: &str) -> u32 {
        let limit = self.limit_for(provider);
        let mut windows = self.lock_windows();
        let window = windows.entry(provider.to_string()).or_default();
        let used = Self::prune(window, &limit, Instant::now()) as u32;
        limit.requests_per_window.saturating_sub(used)
    }

    /// Forget every recorded call for the provider.
    pub fn reset(&self, provider: &str) {
        self.lock_windows().remove(provider);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
