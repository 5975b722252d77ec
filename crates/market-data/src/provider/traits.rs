//! Market data provider trait definitions.
//!
//! This module defines the core `MarketDataProvider` trait that all
//! market data providers must implement.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{Fundamentals, Quote};

use super::capabilities::{ProviderCapabilities, RateLimit};

/// Per-symbol outcome of a bulk price call.
pub type BulkQuotes = HashMap<String, Result<Quote, MarketDataError>>;

/// Trait for market data providers.
///
/// Implement this trait to add support for a new market data source.
/// Adapters translate one HTTP API into [`Quote`] / [`Fundamentals`] values
/// and classify every failure into a typed [`MarketDataError`]. They never
/// cache and never fabricate values: an absent price is an error.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use quorum_market_data::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};
///
/// struct MyProvider {
///     api_key: String,
/// }
///
/// #[async_trait]
/// impl MarketDataProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn capabilities(&self) -> ProviderCapabilities {
///         ProviderCapabilities::default()
///     }
///
///     fn rate_limit(&self) -> RateLimit {
///         RateLimit::per_minute(30)
///     }
///
///     async fn fetch_price(&self, symbol: &str) -> Result<Quote, MarketDataError> {
///         // ...
///     }
/// }
/// ```
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// Should be a constant string like "FINNHUB", "ALPHA_VANTAGE", etc.
    /// Used for logging, circuit breaker keys and audit records.
    fn id(&self) -> &'static str;

    /// Provider priority for ordering.
    ///
    /// Lower values = higher priority. Default is 10.
    fn priority(&self) -> u8 {
        10
    }

    /// Describes what this provider can do.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Call budget the registry enforces for this provider.
    fn rate_limit(&self) -> RateLimit;

    /// Fetch the latest price for one symbol.
    async fn fetch_price(&self, symbol: &str) -> Result<Quote, MarketDataError>;

    /// Fetch latest prices for several symbols in one call.
    ///
    /// The outer error means the whole call failed. Symbols the provider did
    /// not return map to `SymbolNotFound`.
    /// Default implementation returns `NotSupported`.
    async fn fetch_prices(&self, symbols: &[String]) -> Result<BulkQuotes, MarketDataError> {
        let _ = symbols;
        Err(MarketDataError::NotSupported {
            operation: "bulk quotes".to_string(),
            provider: self.id().to_string(),
        })
    }

    /// Fetch company fundamentals.
    ///
    /// Default implementation returns `NotSupported`.
    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals, MarketDataError> {
        let _ = symbol;
        Err(MarketDataError::NotSupported {
            operation: "fundamentals".to_string(),
            provider: self.id().to_string(),
        })
    }
}
