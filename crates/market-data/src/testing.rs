//! Scripted provider shared by the registry, resolver and verification tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::errors::MarketDataError;
use crate::models::{Fundamentals, Quote};
use crate::provider::{BulkQuotes, MarketDataProvider, ProviderCapabilities, RateLimit};

#[derive(Clone, Debug)]
pub(crate) enum Script {
    /// Every symbol quotes at this price.
    Price(Decimal),
    /// Listed symbols quote, everything else is not found.
    PerSymbol(HashMap<String, Decimal>),
    /// Every call fails with this error.
    Fail(MarketDataError),
}

pub(crate) struct MockProvider {
    id: &'static str,
    priority: u8,
    capabilities: ProviderCapabilities,
    rate_limit: RateLimit,
    delay: Option<Duration>,
    script: Mutex<Script>,
    pub calls: AtomicUsize,
    pub bulk_calls: AtomicUsize,
    pub fundamentals_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(id: &'static str, priority: u8, script: Script) -> Self {
        Self {
            id,
            priority,
            capabilities: ProviderCapabilities::default(),
            rate_limit: RateLimit::per_minute(1000),
            delay: None,
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            bulk_calls: AtomicUsize::new(0),
            fundamentals_calls: AtomicUsize::new(0),
        }
    }

    pub fn price(id: &'static str, priority: u8, price: Decimal) -> Self {
        Self::new(id, priority, Script::Price(price))
    }

    pub fn failing(id: &'static str, priority: u8, error: MarketDataError) -> Self {
        Self::new(id, priority, Script::Fail(error))
    }

    pub fn timeout_error(id: &'static str) -> MarketDataError {
        MarketDataError::Timeout {
            provider: id.to_string(),
        }
    }

    pub fn with_bulk(mut self, max_batch_size: usize) -> Self {
        self.capabilities.supports_bulk = true;
        self.capabilities.max_batch_size = max_batch_size;
        self
    }

    pub fn with_fundamentals(mut self) -> Self {
        self.capabilities.supports_fundamentals = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_rate_limit(mut self, limit: RateLimit) -> Self {
        self.rate_limit = limit;
        self
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    fn answer(&self, symbol: &str) -> Result<Decimal, MarketDataError> {
        match &*self.script.lock().unwrap() {
            Script::Price(p) => Ok(*p),
            Script::PerSymbol(prices) => prices.get(symbol).copied().ok_or_else(|| {
                MarketDataError::SymbolNotFound {
                    provider: self.id.to_string(),
                    symbol: symbol.to_string(),
                }
            }),
            Script::Fail(e) => Err(e.clone()),
        }
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities.clone()
    }

    fn rate_limit(&self) -> RateLimit {
        self.rate_limit.clone()
    }

    async fn fetch_price(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let price = self.answer(symbol)?;
        Ok(Quote::new(symbol, price, Utc::now(), self.id))
    }

    async fn fetch_prices(&self, symbols: &[String]) -> Result<BulkQuotes, MarketDataError> {
        if !self.capabilities.supports_bulk {
            return Err(MarketDataError::NotSupported {
                operation: "bulk quotes".to_string(),
                provider: self.id.to_string(),
            });
        }
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if let Script::Fail(e) = &*self.script.lock().unwrap() {
            return Err(e.clone());
        }

        Ok(symbols
            .iter()
            .map(|s| {
                let result = self
                    .answer(s)
                    .map(|price| Quote::new(s.clone(), price, Utc::now(), self.id));
                (s.clone(), result)
            })
            .collect())
    }

    /// Fundamentals mirror the scripted price into market cap and P/E.
    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals, MarketDataError> {
        if !self.capabilities.supports_fundamentals {
            return Err(MarketDataError::NotSupported {
                operation: "fundamentals".to_string(),
                provider: self.id.to_string(),
            });
        }
        self.fundamentals_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let value = self.answer(symbol)?;
        let mut f = Fundamentals::new(symbol, self.id);
        f.market_cap = Some(value);
        f.pe_ratio = Some(value);
        Ok(f)
    }
}
