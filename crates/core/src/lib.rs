//! Quorum Core - configuration, service facade and trust scoring.
//!
//! This crate wires the `quorum-market-data` building blocks into a single
//! [`MarketDataService`] and adds the trust scorer on top of verified data.

pub mod config;
pub mod errors;
pub mod market;
pub mod trust;

pub use config::{Config, ProviderKind, ProviderSetting};
pub use market::{MarketDataService, MarketDataServiceTrait};
pub use trust::{
    BandLabel, CategoryScore, ConfidenceBand, FullMetrics, TrustCategory, TrustScore, TrustScorer,
};

// Re-export error types
pub use errors::{ConfigError, Error, ErrorPayload, Result};
