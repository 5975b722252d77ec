//! Market data models
//!
//! This module contains the core data types for market data operations:
//! - `quote` - Quote data structures (Quote, Resolved, ResolvedQuote)
//! - `fundamentals` - Company fundamentals (Fundamentals)

use std::borrow::Cow;

mod fundamentals;
mod quote;

pub use fundamentals::Fundamentals;
pub use quote::{Quote, Resolved, ResolvedQuote, CACHE_SOURCE};

/// Provider id as stored in diagnostics; usually one of the adapters' constants.
pub type ProviderId = Cow<'static, str>;
