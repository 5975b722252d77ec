//! Price and fundamentals resolution across providers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     WaterfallResolver                        │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐ │
//! │  │ 1. TtlCache                                             │ │
//! │  │    - Fresh entry -> returned, tagged cached             │ │
//! │  └────────────────────────────────────────────────────────┘ │
//! │                           │ miss                             │
//! │                           ▼                                  │
//! │  ┌────────────────────────────────────────────────────────┐ │
//! │  │ 2. Providers in registry order                          │ │
//! │  │    - CircuitBreaker gate per provider                   │ │
//! │  │    - Registry applies rate limit, timeout, validation   │ │
//! │  └────────────────────────────────────────────────────────┘ │
//! │                           │ all failed                       │
//! │                           ▼                                  │
//! │  ┌────────────────────────────────────────────────────────┐ │
//! │  │ 3. Stale cache entry, or NoDataAvailable                │ │
//! │  └────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Batch resolution takes a [`FetchStrategy`] that decides whether
//! per-symbol calls run one at a time or concurrently.

mod cache;
mod strategy;
mod waterfall;

pub use cache::{CacheEntry, TtlCache};
pub use strategy::{FetchStrategy, DEFAULT_MAX_IN_FLIGHT};
pub use waterfall::{
    BatchResults, ResolverConfig, WaterfallResolver, DEFAULT_FUNDAMENTALS_TTL, DEFAULT_QUOTE_TTL,
};
