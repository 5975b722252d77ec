//! Finnhub market data provider implementation.
//!
//! This module provides market data from Finnhub API:
//! - Latest equity prices via /quote
//! - Fundamentals via /stock/metric (ratios) merged with /stock/profile2 (identity)
//!
//! Finnhub free tier is limited to 60 API calls per minute.
//! API documentation: https://finnhub.io/docs/api

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{Fundamentals, Quote};
use crate::provider::http::{self, DEFAULT_HTTP_TIMEOUT};
use crate::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "https://finnhub.io/api/v1";
const PROVIDER_ID: &str = "FINNHUB";

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /quote endpoint
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
    /// Change
    d: Option<f64>,
    /// Percent change
    dp: Option<f64>,
    /// Open price of the day
    o: Option<f64>,
    /// Timestamp (Unix)
    t: Option<i64>,
    // Note: h, l, pc exist but not used
}

/// Response from /stock/metric?metric=all
#[derive(Debug, Deserialize)]
struct MetricResponse {
    #[serde(default)]
    metric: Option<Metrics>,
}

#[derive(Debug, Default, Deserialize)]
struct Metrics {
    #[serde(rename = "peTTM")]
    pe_ttm: Option<f64>,
    #[serde(rename = "peBasicExclExtraTTM")]
    pe_basic: Option<f64>,
    #[serde(rename = "epsTTM")]
    eps_ttm: Option<f64>,
    beta: Option<f64>,
    #[serde(rename = "currentDividendYieldTTM")]
    dividend_yield: Option<f64>,
    #[serde(rename = "52WeekHigh")]
    week_52_high: Option<f64>,
    #[serde(rename = "52WeekLow")]
    week_52_low: Option<f64>,
    /// Market capitalization (in millions)
    #[serde(rename = "marketCapitalization")]
    market_capitalization: Option<f64>,
}

/// Response from /stock/profile2 endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    name: Option<String>,
    ticker: Option<String>,
    finnhub_industry: Option<String>,
    /// Market capitalization (in millions)
    market_capitalization: Option<f64>,
}

/// Error body Finnhub returns with some 200 and 4xx responses
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

// ============================================================================
// FinnhubProvider
// ============================================================================

/// Finnhub market data provider.
///
/// Highest-priority source for single quotes and the primary fundamentals source.
pub struct FinnhubProvider {
    client: Client,
    timeout: Duration,
    api_key: String,
    base_url: String,
}

impl FinnhubProvider {
    /// Create a new Finnhub provider with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: http::build_client(DEFAULT_HTTP_TIMEOUT),
            timeout: DEFAULT_HTTP_TIMEOUT,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the provider at a different host (used against mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http::build_client(timeout);
        self.timeout = timeout;
        self
    }

    /// Make a GET request to the Finnhub API.
    async fn fetch(&self, endpoint: &str, symbol: &str, params: &[(&str, &str)]) -> Result<String, MarketDataError> {
        let url = format!("{}{}", self.base_url, endpoint);

        // API key as header keeps it out of URLs and logs
        let request = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", &self.api_key)
            .query(params);

        debug!("Finnhub request: {} for {}", endpoint, symbol);

        let text = http::send(PROVIDER_ID, symbol, self.timeout, request).await?;

        // Finnhub occasionally reports errors in a 200 body
        if let Ok(ErrorResponse { error: Some(message) }) = serde_json::from_str(&text) {
            return Err(http::classify_message(PROVIDER_ID, &message));
        }

        Ok(text)
    }

    fn parse_quote(symbol: &str, text: &str) -> Result<Quote, MarketDataError> {
        let response: QuoteResponse = http::parse_json(PROVIDER_ID, text)?;

        let close = response
            .c
            .ok_or_else(|| MarketDataError::parse(PROVIDER_ID, "Quote response has no price"))?;

        // Finnhub returns zeros for unknown symbols instead of an error
        if close == 0.0 && response.o.unwrap_or(0.0) == 0.0 {
            return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
        }

        let price = Decimal::try_from(close).map_err(|_| {
            MarketDataError::parse(PROVIDER_ID, format!("Invalid price: {}", close))
        })?;

        let timestamp = response
            .t
            .filter(|ts| *ts > 0)
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(Utc::now);

        Ok(Quote::new(symbol, price, timestamp, PROVIDER_ID).with_change(
            response.d.and_then(|v| Decimal::try_from(v).ok()),
            response.dp.and_then(|v| Decimal::try_from(v).ok()),
        ))
    }

    fn merge_fundamentals(
        symbol: &str,
        metric: MetricResponse,
        profile: ProfileResponse,
    ) -> Result<Fundamentals, MarketDataError> {
        let metrics = metric.metric.unwrap_or_default();
        let millions = Decimal::from(1_000_000);
        let dec = |v: Option<f64>| v.and_then(|v| Decimal::try_from(v).ok());

        let mut fundamentals = Fundamentals::new(symbol, PROVIDER_ID);
        fundamentals.name = profile.name;
        fundamentals.sector = profile.finnhub_industry.clone();
        fundamentals.industry = profile.finnhub_industry;
        // Finnhub reports market cap in millions
        fundamentals.market_cap = dec(profile
            .market_capitalization
            .or(metrics.market_capitalization))
        .map(|mc| {
            mc.checked_mul(millions).ok_or_else(|| {
                MarketDataError::parse(PROVIDER_ID, format!("Market cap out of range: {}M", mc))
            })
        })
        .transpose()?;
        fundamentals.pe_ratio = dec(metrics.pe_ttm.or(metrics.pe_basic));
        fundamentals.eps = dec(metrics.eps_ttm);
        fundamentals.beta = dec(metrics.beta);
        fundamentals.dividend_yield = dec(metrics.dividend_yield);
        fundamentals.week_52_high = dec(metrics.week_52_high);
        fundamentals.week_52_low = dec(metrics.week_52_low);

        if fundamentals.is_empty() && profile.ticker.is_none() {
            return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
        }

        Ok(fundamentals)
    }
}

#[async_trait]
impl MarketDataProvider for FinnhubProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        1
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_bulk: false,
            max_batch_size: 1,
            supports_fundamentals: true,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::per_minute(60)
    }

    async fn fetch_price(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let text = self.fetch("/quote", symbol, &[("symbol", symbol)]).await?;
        Self::parse_quote(symbol, &text)
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals, MarketDataError> {
        let metric_text = self
            .fetch(
                "/stock/metric",
                symbol,
                &[("symbol", symbol), ("metric", "all")],
            )
            .await?;
        let metric: MetricResponse = http::parse_json(PROVIDER_ID, &metric_text)?;

        let profile_text = self
            .fetch("/stock/profile2", symbol, &[("symbol", symbol)])
            .await?;
        // An unknown symbol yields `{}` here
        let profile: ProfileResponse = http::parse_json(PROVIDER_ID, &profile_text)?;

        Self::merge_fundamentals(symbol, metric, profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use mockito::Matcher;
    use rust_decimal_macros::dec;

    #[test]
    fn test_provider_metadata() {
        let provider = FinnhubProvider::new("test_key".to_string());
        assert_eq!(provider.id(), "FINNHUB");
        assert_eq!(provider.priority(), 1);
        assert!(provider.capabilities().supports_fundamentals);
        assert!(!provider.capabilities().supports_bulk);
        assert_eq!(provider.rate_limit().requests_per_window, 60);
    }

    #[test]
    fn test_quote_response_parsing() {
        let json = r#"{
            "c": 150.25,
            "d": 1.5,
            "dp": 1.0,
            "h": 152.00,
            "l": 148.50,
            "o": 149.00,
            "pc": 148.75,
            "t": 1704067200
        }"#;

        let quote = FinnhubProvider::parse_quote("AAPL", json).unwrap();
        assert_eq!(quote.price, dec!(150.25));
        assert_eq!(quote.change, Some(dec!(1.5)));
        assert_eq!(quote.source, "FINNHUB");
        assert_eq!(quote.timestamp.timestamp(), 1704067200);
    }

    #[test]
    fn test_zero_quote_is_symbol_not_found() {
        let json = r#"{"c":0,"d":null,"dp":null,"h":0,"l":0,"o":0,"pc":0,"t":0}"#;
        let err = FinnhubProvider::parse_quote("ZZZZ", json).unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::NotFound));
    }

    #[test]
    fn test_missing_price_is_an_error_not_zero() {
        let err = FinnhubProvider::parse_quote("AAPL", r#"{"o": 10.0}"#).unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::ParseError));
    }

    #[test]
    fn test_fundamentals_merge() {
        let metric: MetricResponse = serde_json::from_str(
            r#"{"metric": {"peTTM": 28.5, "epsTTM": 6.5, "beta": 1.25,
                "52WeekHigh": 199.5, "52WeekLow": 124.25}, "symbol": "AAPL"}"#,
        )
        .unwrap();
        let profile: ProfileResponse = serde_json::from_str(
            r#"{"name": "Apple Inc", "ticker": "AAPL", "finnhubIndustry": "Technology",
                "marketCapitalization": 2800000}"#,
        )
        .unwrap();

        let f = FinnhubProvider::merge_fundamentals("AAPL", metric, profile).unwrap();
        assert_eq!(f.name.as_deref(), Some("Apple Inc"));
        assert_eq!(f.pe_ratio, Some(dec!(28.5)));
        assert_eq!(f.market_cap, Some(dec!(2800000000000)));
        assert_eq!(f.week_52_low, Some(dec!(124.25)));
    }

    #[test]
    fn test_out_of_range_market_cap_is_parse_error() {
        let metric: MetricResponse = serde_json::from_str(r#"{"metric": {}}"#).unwrap();
        let profile: ProfileResponse = serde_json::from_str(
            r#"{"ticker": "AAPL", "marketCapitalization": 1e25}"#,
        )
        .unwrap();

        let err = FinnhubProvider::merge_fundamentals("AAPL", metric, profile).unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::ParseError));
    }

    #[test]
    fn test_empty_fundamentals_is_not_found() {
        let metric: MetricResponse = serde_json::from_str(r#"{"metric": {}}"#).unwrap();
        let profile: ProfileResponse = serde_json::from_str("{}").unwrap();
        let err = FinnhubProvider::merge_fundamentals("ZZZZ", metric, profile).unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::NotFound));
    }

    #[tokio::test]
    async fn test_fetch_price_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/quote")
            .match_query(Matcher::UrlEncoded("symbol".into(), "AAPL".into()))
            .match_header("X-Finnhub-Token", "test_key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"c": 187.5, "d": 2.0, "dp": 1.08, "o": 186.0, "t": 1704067200}"#)
            .create_async()
            .await;

        let provider = FinnhubProvider::new("test_key".to_string()).with_base_url(server.url());
        let quote = provider.fetch_price("AAPL").await.unwrap();

        assert_eq!(quote.price, dec!(187.5));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_forbidden_is_entitlement() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/quote")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"error": "You don't have access to this resource."}"#)
            .create_async()
            .await;

        let provider = FinnhubProvider::new("test_key".to_string()).with_base_url(server.url());
        let err = provider.fetch_price("AAPL").await.unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::Entitlement));
    }

    #[tokio::test]
    async fn test_too_many_requests_is_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/quote")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body(r#"{"error": "API limit reached. Please try again later."}"#)
            .create_async()
            .await;

        let provider = FinnhubProvider::new("test_key".to_string()).with_base_url(server.url());
        let err = provider.fetch_price("AAPL").await.unwrap_err();
        assert!(matches!(err, MarketDataError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/quote")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("Service Unavailable")
            .create_async()
            .await;

        let provider = FinnhubProvider::new("test_key".to_string()).with_base_url(server.url());
        let err = provider.fetch_price("AAPL").await.unwrap_err();
        assert!(matches!(err, MarketDataError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/quote")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let provider = FinnhubProvider::new("test_key".to_string()).with_base_url(server.url());
        let err = provider.fetch_price("AAPL").await.unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::ParseError));
    }
}
