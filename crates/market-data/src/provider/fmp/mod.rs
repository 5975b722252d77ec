//! Financial Modeling Prep (FMP) market data provider implementation.
//!
//! - Latest prices via `/quote/{symbol}`; the same path accepts a
//!   comma-separated list, which backs bulk fetches
//! - Fundamentals via `/profile/{symbol}` merged with the valuation fields of `/quote`
//!
//! FMP answers plan restrictions with HTTP 200/403 bodies carrying an
//! `"Error Message"` such as "Exclusive Endpoint" or "Legacy Endpoint".

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{Fundamentals, Quote};
use crate::provider::http::{self, DEFAULT_HTTP_TIMEOUT};
use crate::provider::{BulkQuotes, MarketDataProvider, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "https://financialmodelingprep.com/api/v3";
const PROVIDER_ID: &str = "FMP";
const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteItem {
    symbol: String,
    name: Option<String>,
    price: Option<f64>,
    change: Option<f64>,
    changes_percentage: Option<f64>,
    market_cap: Option<f64>,
    pe: Option<f64>,
    eps: Option<f64>,
    year_high: Option<f64>,
    year_low: Option<f64>,
    /// Unix seconds
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileItem {
    company_name: Option<String>,
    sector: Option<String>,
    industry: Option<String>,
    mkt_cap: Option<f64>,
    beta: Option<f64>,
    last_div: Option<f64>,
    price: Option<f64>,
}

/// Financial Modeling Prep market data provider.
pub struct FmpProvider {
    client: Client,
    timeout: Duration,
    api_key: String,
    base_url: String,
}

impl FmpProvider {
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

    /// GET `{base}/{endpoint}/{symbols}` and return the list payload.
    async fn fetch_list(&self, endpoint: &str, symbols: &str) -> Result<Vec<Value>, MarketDataError> {
        let url = format!("{}/{}/{}", self.base_url, endpoint, symbols);
        let request = self
            .client
            .get(&url)
            .query(&[("apikey", self.api_key.as_str())]);

        debug!("FMP request: /{} for {}", endpoint, symbols);

        let text = http::send(PROVIDER_ID, symbols, self.timeout, request).await?;
        Self::parse_list(&text)
    }

    /// FMP returns a JSON array on success and an object with
    /// `"Error Message"` on failure, both with status 200.
    fn parse_list(text: &str) -> Result<Vec<Value>, MarketDataError> {
        match http::parse_json::<Value>(PROVIDER_ID, text)? {
            Value::Array(items) => Ok(items),
            Value::Object(map) => {
                let message = map
                    .get("Error Message")
                    .or_else(|| map.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("Unexpected object response");
                Err(http::classify_message(PROVIDER_ID, message))
            }
            other => Err(MarketDataError::parse(
                PROVIDER_ID,
                format!("Unexpected response: {}", other),
            )),
        }
    }

    fn to_quote(item: QuoteItem) -> Result<Quote, MarketDataError> {
        let price = item
            .price
            .filter(|p| *p > 0.0)
            .and_then(|p| Decimal::try_from(p).ok())
            .ok_or_else(|| {
                MarketDataError::parse(PROVIDER_ID, format!("Quote for {} has no price", item.symbol))
            })?;

        let timestamp = item
            .timestamp
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(Utc::now);

        Ok(Quote::new(item.symbol, price, timestamp, PROVIDER_ID).with_change(
            item.change.and_then(|v| Decimal::try_from(v).ok()),
            item.changes_percentage.and_then(|v| Decimal::try_from(v).ok()),
        ))
    }

    fn parse_quote_items(items: Vec<Value>) -> Result<Vec<QuoteItem>, MarketDataError> {
        items
            .into_iter()
            .map(|v| {
                serde_json::from_value(v).map_err(|e| {
                    MarketDataError::parse(PROVIDER_ID, format!("Malformed quote: {}", e))
                })
            })
            .collect()
    }

    fn merge_fundamentals(
        symbol: &str,
        profile: Option<ProfileItem>,
        quote: Option<QuoteItem>,
    ) -> Result<Fundamentals, MarketDataError> {
        if profile.is_none() && quote.is_none() {
            return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
        }

        let dec = |v: Option<f64>| v.and_then(|v| Decimal::try_from(v).ok());
        let mut f = Fundamentals::new(symbol, PROVIDER_ID);

        if let Some(quote) = quote {
            f.name = quote.name;
            f.market_cap = dec(quote.market_cap);
            f.pe_ratio = dec(quote.pe);
            f.eps = dec(quote.eps);
            f.week_52_high = dec(quote.year_high);
            f.week_52_low = dec(quote.year_low);
        }

        if let Some(profile) = profile {
            f.name = profile.company_name.or(f.name);
            f.sector = profile.sector.filter(|s| !s.is_empty());
            f.industry = profile.industry.filter(|s| !s.is_empty());
            f.market_cap = f.market_cap.or(dec(profile.mkt_cap));
            f.beta = dec(profile.beta);
            // Yield from the trailing annual dividend and the profile price
            f.dividend_yield = match (dec(profile.last_div), dec(profile.price)) {
                (Some(div), Some(price)) if !price.is_zero() => Some((div / price).round_dp(6)),
                _ => None,
            };
        }

        Ok(f)
    }
}

#[async_trait]
impl MarketDataProvider for FmpProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        3
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_bulk: true,
            max_batch_size: MAX_BATCH_SIZE,
            supports_fundamentals: true,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        // Free tier: 250 calls per day
        RateLimit {
            requests_per_window: 250,
            window: Duration::from_secs(24 * 60 * 60),
        }
    }

    async fn fetch_price(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let items = Self::parse_quote_items(self.fetch_list("quote", symbol).await?)?;

        let item = items
            .into_iter()
            .next()
            .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))?;

        let mut quote = Self::to_quote(item)?;
        quote.symbol = symbol.to_string();
        Ok(quote)
    }

    async fn fetch_prices(&self, symbols: &[String]) -> Result<BulkQuotes, MarketDataError> {
        let items = Self::parse_quote_items(self.fetch_list("quote", &symbols.join(",")).await?)?;

        let mut by_symbol: HashMap<String, QuoteItem> = items
            .into_iter()
            .map(|item| (item.symbol.to_uppercase(), item))
            .collect();

        Ok(symbols
            .iter()
            .map(|symbol| {
                let result = match by_symbol.remove(&symbol.to_uppercase()) {
                    Some(item) => Self::to_quote(item).map(|mut q| {
                        q.symbol = symbol.clone();
                        q
                    }),
                    None => Err(MarketDataError::not_found(PROVIDER_ID, symbol)),
                };
                (symbol.clone(), result)
            })
            .collect())
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals, MarketDataError> {
        let profile = self
            .fetch_list("profile", symbol)
            .await?
            .into_iter()
            .next()
            .map(serde_json::from_value::<ProfileItem>)
            .transpose()
            .map_err(|e| MarketDataError::parse(PROVIDER_ID, format!("Malformed profile: {}", e)))?;

        let quote = Self::parse_quote_items(self.fetch_list("quote", symbol).await?)?
            .into_iter()
            .next();

        Self::merge_fundamentals(symbol, profile, quote)
    }
}
