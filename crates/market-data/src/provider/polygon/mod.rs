//! Polygon.io market data provider implementation.
//!
//! Prices come from the stocks snapshot endpoints:
//! - `/v2/snapshot/locale/us/markets/stocks/tickers/{ticker}` for one symbol
//! - `/v2/snapshot/locale/us/markets/stocks/tickers?tickers=A,B,C` for bulk
//!
//! Snapshots are a paid feature; free keys receive `NOT_AUTHORIZED`, which is
//! reported as an entitlement failure.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::Quote;
use crate::provider::http::{self, DEFAULT_HTTP_TIMEOUT};
use crate::provider::{BulkQuotes, MarketDataProvider, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "https://api.polygon.io";
const PROVIDER_ID: &str = "POLYGON";
const SNAPSHOT_PATH: &str = "/v2/snapshot/locale/us/markets/stocks/tickers";

/// Polygon caps the `tickers` filter well above this; keep URLs short.
const MAX_BATCH_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
struct SingleSnapshotResponse {
    status: Option<String>,
    ticker: Option<TickerSnapshot>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BulkSnapshotResponse {
    status: Option<String>,
    #[serde(default)]
    tickers: Vec<TickerSnapshot>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerSnapshot {
    ticker: String,
    todays_change: Option<f64>,
    todays_change_perc: Option<f64>,
    day: Option<Bar>,
    min: Option<Bar>,
    last_trade: Option<Trade>,
    /// Nanoseconds since epoch
    updated: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Bar {
    c: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Trade {
    p: Option<f64>,
    /// SIP timestamp, nanoseconds since epoch
    t: Option<i64>,
}

/// Polygon.io market data provider.
pub struct PolygonProvider {
    client: Client,
    timeout: Duration,
    api_key: String,
    base_url: String,
}

impl PolygonProvider {
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

    async fn fetch(&self, path: &str, label: &str, params: &[(&str, &str)]) -> Result<String, MarketDataError> {
        let url = format!("{}{}", self.base_url, path);
        let request = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(params);

        debug!("Polygon request: {} for {}", path, label);
        http::send(PROVIDER_ID, label, self.timeout, request).await
    }

    /// Check the `status` envelope Polygon wraps every response in.
    fn check_status(
        symbol: &str,
        status: Option<&str>,
        message: Option<&str>,
    ) -> Result<(), MarketDataError> {
        match status {
            Some("OK") | Some("DELAYED") | None => Ok(()),
            Some("NOT_FOUND") => Err(MarketDataError::not_found(PROVIDER_ID, symbol)),
            Some("NOT_AUTHORIZED") => Err(MarketDataError::Entitlement {
                provider: PROVIDER_ID.to_string(),
                message: message.unwrap_or("NOT_AUTHORIZED").to_string(),
            }),
            Some(other) => Err(http::classify_message(
                PROVIDER_ID,
                &format!("{}: {}", other, message.unwrap_or_default()),
            )),
        }
    }

    fn to_quote(snapshot: TickerSnapshot) -> Result<Quote, MarketDataError> {
        // Prefer the last trade, then the latest minute bar, then the day bar
        let price = snapshot
            .last_trade
            .as_ref()
            .and_then(|t| t.p)
            .filter(|p| *p > 0.0)
            .or_else(|| snapshot.min.as_ref().and_then(|b| b.c).filter(|p| *p > 0.0))
            .or_else(|| snapshot.day.as_ref().and_then(|b| b.c).filter(|p| *p > 0.0))
            .ok_or_else(|| {
                MarketDataError::parse(
                    PROVIDER_ID,
                    format!("Snapshot for {} has no trade price", snapshot.ticker),
                )
            })?;

        let price = Decimal::try_from(price).map_err(|_| {
            MarketDataError::parse(PROVIDER_ID, format!("Invalid price: {}", price))
        })?;

        let timestamp = snapshot
            .last_trade
            .as_ref()
            .and_then(|t| t.t)
            .or(snapshot.updated)
            .and_then(from_nanos)
            .unwrap_or_else(Utc::now);

        Ok(Quote::new(snapshot.ticker, price, timestamp, PROVIDER_ID).with_change(
            snapshot.todays_change.and_then(|v| Decimal::try_from(v).ok()),
            snapshot.todays_change_perc.and_then(|v| Decimal::try_from(v).ok()),
        ))
    }

    fn parse_single(symbol: &str, text: &str) -> Result<Quote, MarketDataError> {
        let response: SingleSnapshotResponse = http::parse_json(PROVIDER_ID, text)?;
        Self::check_status(symbol, response.status.as_deref(), response.message.as_deref())?;

        let snapshot = response
            .ticker
            .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))?;

        let mut quote = Self::to_quote(snapshot)?;
        quote.symbol = symbol.to_string();
        Ok(quote)
    }

    fn parse_bulk(symbols: &[String], text: &str) -> Result<BulkQuotes, MarketDataError> {
        let label = symbols.join(",");
        let response: BulkSnapshotResponse = http::parse_json(PROVIDER_ID, text)?;
        Self::check_status(&label, response.status.as_deref(), response.message.as_deref())?;

        let mut by_ticker: HashMap<String, TickerSnapshot> = response
            .tickers
            .into_iter()
            .map(|s| (s.ticker.to_uppercase(), s))
            .collect();

        Ok(symbols
            .iter()
            .map(|symbol| {
                let result = match by_ticker.remove(&symbol.to_uppercase()) {
                    Some(snapshot) => Self::to_quote(snapshot).map(|mut q| {
                        q.symbol = symbol.clone();
                        q
                    }),
                    None => Err(MarketDataError::not_found(PROVIDER_ID, symbol)),
                };
                (symbol.clone(), result)
            })
            .collect())
    }
}

fn from_nanos(nanos: i64) -> Option<DateTime<Utc>> {
    if nanos <= 0 {
        return None;
    }
    Some(Utc.timestamp_nanos(nanos))
}

#[async_trait]
impl MarketDataProvider for PolygonProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        2
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_bulk: true,
            max_batch_size: MAX_BATCH_SIZE,
            supports_fundamentals: false,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        // Free tier
        RateLimit::per_minute(5)
    }

    async fn fetch_price(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let path = format!("{}/{}", SNAPSHOT_PATH, urlencoding::encode(symbol));
        let text = self.fetch(&path, symbol, &[]).await?;
        Self::parse_single(symbol, &text)
    }

    async fn fetch_prices(&self, symbols: &[String]) -> Result<BulkQuotes, MarketDataError> {
        let tickers = symbols.join(",");
        let text = self
            .fetch(SNAPSHOT_PATH, &tickers, &[("tickers", tickers.as_str())])
            .await?;
        Self::parse_bulk(symbols, &text)
    }
}
