//! Provider capabilities and rate limiting configuration.
//!
//! This module defines structures for describing what a market data provider
//! can do and how it should be rate-limited.

use std::time::Duration;

/// Describes the capabilities of a market data provider.
///
/// Used by the resolver to decide which providers take part in a bulk
/// request or a fundamentals lookup.
#[derive(Clone, Debug)]
pub struct ProviderCapabilities {
    /// Whether the provider can quote several symbols in one call.
    pub supports_bulk: bool,

    /// Largest number of symbols accepted per bulk call.
    pub max_batch_size: usize,

    /// Whether the provider serves company fundamentals.
    pub supports_fundamentals: bool,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            supports_bulk: false,
            max_batch_size: 1,
            supports_fundamentals: false,
        }
    }
}

/// Rate limiting configuration for a provider.
///
/// Controls how aggressively we can call a provider to avoid
/// hitting their rate limits and getting blocked.
#[derive(Clone, Debug)]
pub struct RateLimit {
    /// Maximum requests allowed per rolling window.
    pub requests_per_window: u32,

    /// Length of the rolling window.
    pub window: Duration,
}

impl RateLimit {
    pub fn per_minute(requests: u32) -> Self {
        Self {
            requests_per_window: requests,
            window: Duration::from_secs(60),
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::per_minute(60)
    }
}
