//! Market data provider abstractions and implementations.
//!
//! This module contains:
//! - The `MarketDataProvider` trait that all providers implement
//! - Provider capabilities and rate limiting configuration
//! - Shared HTTP failure classification
//! - Concrete provider implementations (Finnhub, Polygon, FMP, Alpha Vantage)
//!
//! # Architecture
//!
//! The provider system is designed to be:
//! - **Provider-agnostic**: The resolver only sees `MarketDataProvider`
//! - **Extensible**: New providers can be added by implementing `MarketDataProvider`
//! - **Resilient**: Rate limiting and circuit breakers live in the registry, not in adapters

mod capabilities;
pub mod http;
mod traits;

pub mod alpha_vantage;
pub mod finnhub;
pub mod fmp;
pub mod polygon;

// Re-exports
pub use capabilities::{ProviderCapabilities, RateLimit};
pub use traits::{BulkQuotes, MarketDataProvider};
