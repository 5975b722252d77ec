//! Quorum Market Data Crate
//!
//! This crate resolves prices and fundamentals across several third-party
//! market data providers and keeps working when some of them do not.
//!
//! # Overview
//!
//! The market data crate supports:
//! - Multiple providers: Finnhub, Polygon, Financial Modeling Prep, Alpha Vantage
//! - Ordered fallback with caching and last-known-good values
//! - Rate limiting and circuit breaking, with entitlement-aware disabling
//! - Cross-provider verification with an audit trail
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +----------------------+
//! |     Caller       | --> |  WaterfallResolver   |  (first success wins)
//! +------------------+  |  +----------------------+
//!                       |             |
//!                       |  +----------------------+
//!                       +->|  VerificationEngine  |  (every source, graded)
//!                          +----------------------+
//!                                     |
//!                                     v
//!                          +----------------------+
//!                          |    CircuitBreaker    |  (memory or Redis state)
//!                          +----------------------+
//!                                     |
//!                                     v
//!                          +----------------------+
//!                          |   ProviderRegistry   |  (rate limit, timeout, validation)
//!                          +----------------------+
//!                                     |
//!                                     v
//!                          +----------------------+
//!                          |      Provider        |  (Finnhub, Polygon, etc.)
//!                          +----------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Quote`] - Normalized price quote
//! - [`ResolvedQuote`] - Quote tagged with source, cached and stale flags
//! - [`Fundamentals`] - Company fundamentals
//! - [`MarketDataError`] - Typed provider and resolution failures
//! - [`VerifiedQuote`] - Median value with status, confidence and audit record

pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod verification;

#[cfg(test)]
mod testing;

pub use errors::{FailureKind, MarketDataError, ProviderFailure, RetryClass};

// Re-export all public types from models
pub use models::{Fundamentals, ProviderId, Quote, Resolved, ResolvedQuote, CACHE_SOURCE};

// Re-export provider types
pub use provider::alpha_vantage::AlphaVantageProvider;
pub use provider::finnhub::FinnhubProvider;
pub use provider::fmp::FmpProvider;
pub use provider::polygon::PolygonProvider;
pub use provider::{BulkQuotes, MarketDataProvider, ProviderCapabilities, RateLimit};

// Re-export registry types
pub use registry::{
    CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState, FetchDiagnostics,
    ProviderAttempt, ProviderRegistration, ProviderRegistry, QuoteValidator, RateLimiter,
    SkipReason, ValidationSeverity,
};

// Re-export resolver types
pub use resolver::{BatchResults, FetchStrategy, ResolverConfig, WaterfallResolver};

// Re-export verification types
pub use verification::{
    AuditEntry, Metric, VerificationEngine, VerificationMetrics, VerificationStatus,
    VerifiedQuote,
};
