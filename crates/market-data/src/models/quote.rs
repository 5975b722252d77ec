use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Source label attached to a stale last-known-good fallback.
pub const CACHE_SOURCE: &str = "cache";

/// Normalized price quote produced by a provider adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Symbol as requested by the caller
    pub symbol: String,

    /// Last traded / current price (required, always positive once validated)
    pub price: Decimal,

    /// Timestamp reported by the provider, or fetch time when absent
    pub timestamp: DateTime<Utc>,

    /// Provider id that produced the quote (FINNHUB, POLYGON, etc.)
    pub source: String,

    /// Absolute change versus previous close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<Decimal>,

    /// Percent change versus previous close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<Decimal>,
}

impl Quote {
    /// Create a new quote with minimal required fields
    pub fn new(
        symbol: impl Into<String>,
        price: Decimal,
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp,
            source: source.into(),
            change: None,
            change_percent: None,
        }
    }

    /// Attach day change figures
    pub fn with_change(mut self, change: Option<Decimal>, change_percent: Option<Decimal>) -> Self {
        self.change = change;
        self.change_percent = change_percent;
        self
    }
}

/// A value handed back to callers of the resolver, with provenance.
///
/// `source` is the provider id for live and cached hits, and [`CACHE_SOURCE`]
/// when every provider failed and an expired entry was served instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: String,
    /// Served from a fresh cache entry without calling any provider.
    pub cached: bool,
    /// Served from an expired cache entry because every provider failed.
    pub stale: bool,
    /// When the underlying value was fetched from its provider.
    pub fetched_at: DateTime<Utc>,
}

/// Resolved price quote.
pub type ResolvedQuote = Resolved<Quote>;

impl<T> Resolved<T> {
    pub fn live(value: T, source: impl Into<String>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            source: source.into(),
            cached: false,
            stale: false,
            fetched_at,
        }
    }

    pub fn cached(value: T, source: impl Into<String>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            source: source.into(),
            cached: true,
            stale: false,
            fetched_at,
        }
    }

    pub fn stale(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            source: CACHE_SOURCE.to_string(),
            cached: true,
            stale: true,
            fetched_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_new() {
        let quote = Quote::new("AAPL", dec!(150.25), Utc::now(), "FINNHUB");
        assert_eq!(quote.price, dec!(150.25));
        assert_eq!(quote.source, "FINNHUB");
        assert!(quote.change.is_none());
    }

    #[test]
    fn test_quote_serialization_skips_missing_change() {
        let quote = Quote::new("AAPL", dec!(150.25), Utc::now(), "FMP");
        let json = serde_json::to_value(&quote).unwrap();
        assert!(json.get("change").is_none());

        let quote = quote.with_change(Some(dec!(1.5)), Some(dec!(1.01)));
        let json = serde_json::to_value(&quote).unwrap();
        assert!(json.get("change").is_some());
    }

    #[test]
    fn test_stale_is_tagged_as_cache() {
        let quote = Quote::new("AAPL", dec!(150), Utc::now(), "POLYGON");
        let resolved = Resolved::stale(quote, Utc::now());
        assert_eq!(resolved.source, "cache");
        assert!(resolved.stale);
        assert!(resolved.cached);
        // The quote keeps naming the provider that originally produced it
        assert_eq!(resolved.value.source, "POLYGON");
    }
}
