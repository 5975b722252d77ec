//! Alpha Vantage market data provider implementation.
//!
//! This module provides market data from Alpha Vantage API:
//! - Latest equity prices via GLOBAL_QUOTE
//! - Company fundamentals via OVERVIEW
//!
//! Note: Alpha Vantage free tier is limited to 5 API calls per minute.
//! Every failure arrives with HTTP 200 and one of `Error Message`, `Note` or
//! `Information` in the body.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use log::debug;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::MarketDataError;
use crate::models::{Fundamentals, Quote};
use crate::provider::http::{self, DEFAULT_HTTP_TIMEOUT};
use crate::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER_ID: &str = "ALPHA_VANTAGE";

// ============================================================================
// Response structures for Alpha Vantage API
// ============================================================================

/// Fields Alpha Vantage uses to report errors and throttling
#[derive(Debug, Default, Deserialize)]
struct ApiMessages {
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

/// GLOBAL_QUOTE response
#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(flatten)]
    messages: ApiMessages,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "07. latest trading day")]
    latest_trading_day: Option<String>,
    #[serde(rename = "09. change")]
    change: Option<String>,
    /// e.g. "1.0180%"
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

/// OVERVIEW response (all values are strings, "None" when missing)
#[derive(Debug, Deserialize)]
struct CompanyOverviewResponse {
    #[serde(rename = "Symbol")]
    symbol: Option<String>,
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Sector")]
    sector: Option<String>,
    #[serde(rename = "Industry")]
    industry: Option<String>,
    #[serde(rename = "MarketCapitalization")]
    market_cap: Option<String>,
    #[serde(rename = "PERatio")]
    pe_ratio: Option<String>,
    #[serde(rename = "EPS")]
    eps: Option<String>,
    #[serde(rename = "Beta")]
    beta: Option<String>,
    #[serde(rename = "DividendYield")]
    dividend_yield: Option<String>,
    #[serde(rename = "52WeekHigh")]
    week_52_high: Option<String>,
    #[serde(rename = "52WeekLow")]
    week_52_low: Option<String>,
    #[serde(flatten)]
    messages: ApiMessages,
}

/// Alpha Vantage market data provider.
///
/// Lowest-priority fallback for prices; also serves fundamentals.
pub struct AlphaVantageProvider {
    client: Client,
    timeout: Duration,
    api_key: String,
    base_url: String,
}

impl AlphaVantageProvider {
    /// Create a new Alpha Vantage provider.
    pub fn new(api_key: String) -> Self {
        Self {
            client: http::build_client(DEFAULT_HTTP_TIMEOUT),
            timeout: DEFAULT_HTTP_TIMEOUT,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http::build_client(timeout);
        self.timeout = timeout;
        self
    }

    /// Make a request to the Alpha Vantage API.
    async fn fetch(&self, function: &str, symbol: &str) -> Result<String, MarketDataError> {
        let request = self.client.get(&self.base_url).query(&[
            ("function", function),
            ("symbol", symbol),
            ("apikey", self.api_key.as_str()),
        ]);

        // Never log the URL: the key travels as a query parameter
        debug!("Alpha Vantage request: {} for {}", function, symbol);

        http::send(PROVIDER_ID, symbol, self.timeout, request).await
    }

    /// Check for API-level errors in the response.
    fn check_api_error(symbol: &str, messages: &ApiMessages) -> Result<(), MarketDataError> {
        if let Some(ref msg) = messages.error_message {
            // "Invalid API call" is how unknown symbols are reported
            if msg.contains("Invalid API call") || msg.contains("not found") {
                return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
            }
            return Err(http::classify_message(PROVIDER_ID, msg));
        }

        if let Some(msg) = messages.note.as_ref().or(messages.information.as_ref()) {
            return Err(http::classify_message(PROVIDER_ID, msg));
        }

        Ok(())
    }

    /// Parse a decimal value from a string; "None" and "-" mean absent.
    fn parse_decimal(s: Option<&str>) -> Option<Decimal> {
        s.map(|v| v.trim().trim_end_matches('%'))
            .filter(|v| !v.is_empty() && *v != "None" && *v != "-")
            .and_then(|v| Decimal::from_str(v).ok())
    }

    fn parse_quote(symbol: &str, text: &str) -> Result<Quote, MarketDataError> {
        let response: GlobalQuoteResponse = http::parse_json(PROVIDER_ID, text)?;
        Self::check_api_error(symbol, &response.messages)?;

        // Unknown symbols come back as an empty "Global Quote" object
        let quote = response
            .global_quote
            .filter(|q| q.price.is_some())
            .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))?;

        let price = Self::parse_decimal(quote.price.as_deref())
            .filter(|p| p.is_sign_positive() && !p.is_zero())
            .ok_or_else(|| {
                MarketDataError::parse(PROVIDER_ID, format!("Invalid price for {}", symbol))
            })?;

        let timestamp = quote
            .latest_trading_day
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|dt| Utc.from_local_datetime(&dt).single())
            .unwrap_or_else(Utc::now);

        Ok(Quote::new(symbol, price, timestamp, PROVIDER_ID).with_change(
            Self::parse_decimal(quote.change.as_deref()),
            Self::parse_decimal(quote.change_percent.as_deref()),
        ))
    }

    fn parse_overview(symbol: &str, text: &str) -> Result<Fundamentals, MarketDataError> {
        let response: CompanyOverviewResponse = http::parse_json(PROVIDER_ID, text)?;
        Self::check_api_error(symbol, &response.messages)?;

        // Unknown symbols come back as `{}`
        if response.symbol.is_none() {
            return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
        }

        let text_field = |v: Option<String>| v.filter(|s| !s.is_empty() && s != "None");

        let mut f = Fundamentals::new(symbol, PROVIDER_ID);
        f.name = text_field(response.name);
        f.sector = text_field(response.sector);
        f.industry = text_field(response.industry);
        f.market_cap = Self::parse_decimal(response.market_cap.as_deref());
        f.pe_ratio = Self::parse_decimal(response.pe_ratio.as_deref());
        f.eps = Self::parse_decimal(response.eps.as_deref());
        f.beta = Self::parse_decimal(response.beta.as_deref());
        f.dividend_yield = Self::parse_decimal(response.dividend_yield.as_deref());
        f.week_52_high = Self::parse_decimal(response.week_52_high.as_deref());
        f.week_52_low = Self::parse_decimal(response.week_52_low.as_deref());
        Ok(f)
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        4
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_bulk: false,
            max_batch_size: 1,
            supports_fundamentals: true,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::per_minute(5)
    }

    async fn fetch_price(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let text = self.fetch("GLOBAL_QUOTE", symbol).await?;
        Self::parse_quote(symbol, &text)
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals, MarketDataError> {
        let text = self.fetch("OVERVIEW", symbol).await?;
        Self::parse_overview(symbol, &text)
    }
}
