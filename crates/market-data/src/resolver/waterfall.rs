//! Waterfall resolution across providers.
//!
//! Providers are tried in registry order, stopping at the first success:
//! 1. A fresh cache entry is returned without touching any provider
//! 2. Providers whose circuit is open are skipped
//! 3. A success is cached, clears the provider's circuit and is returned
//! 4. A failure is fed to the circuit breaker according to its retry class
//! 5. When every provider is exhausted the last cached value is served as
//!    stale, or `NoDataAvailable` names every provider that failed

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};

use super::cache::TtlCache;
use super::strategy::FetchStrategy;
use crate::errors::{MarketDataError, RetryClass};
use crate::models::{Fundamentals, Quote, Resolved, ResolvedQuote};
use crate::provider::MarketDataProvider;
use crate::registry::{CircuitBreaker, FetchDiagnostics, ProviderRegistry, SkipReason};

/// Default freshness window for quotes.
pub const DEFAULT_QUOTE_TTL: Duration = Duration::from_secs(60);

/// Default freshness window for fundamentals.
pub const DEFAULT_FUNDAMENTALS_TTL: Duration = Duration::from_secs(60 * 60);

/// Per-symbol outcome of a batch resolve.
pub type BatchResults = HashMap<String, Result<ResolvedQuote, MarketDataError>>;

#[derive(Clone, Debug)]
pub struct ResolverConfig {
    pub quote_ttl: Duration,
    pub fundamentals_ttl: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            quote_ttl: DEFAULT_QUOTE_TTL,
            fundamentals_ttl: DEFAULT_FUNDAMENTALS_TTL,
        }
    }
}

/// Outcome of asking one provider about one symbol in a batch.
enum Attempt {
    Skipped(SkipReason),
    Fetched(Result<Quote, MarketDataError>),
}

/// Ordered-fallback resolver for prices and fundamentals.
pub struct WaterfallResolver {
    registry: Arc<ProviderRegistry>,
    breaker: Arc<CircuitBreaker>,
    quotes: TtlCache<Quote>,
    fundamentals: TtlCache<Fundamentals>,
}

impl WaterfallResolver {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        breaker: Arc<CircuitBreaker>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            registry,
            breaker,
            quotes: TtlCache::new(config.quote_ttl),
            fundamentals: TtlCache::new(config.fundamentals_ttl),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn quote_cache(&self) -> &TtlCache<Quote> {
        &self.quotes
    }

    pub fn fundamentals_cache(&self) -> &TtlCache<Fundamentals> {
        &self.fundamentals
    }

    fn note_failure(diagnostics: &mut FetchDiagnostics, provider_id: &'static str, error: MarketDataError) {
        if matches!(error, MarketDataError::RateLimitExceeded { .. }) {
            diagnostics.record_skip(Cow::Borrowed(provider_id), SkipReason::RateLimited);
        } else {
            diagnostics.record_error(Cow::Borrowed(provider_id), error);
        }
    }

    /// Serve the last known value, or report every failed source.
    fn fall_back<T: Clone>(
        symbol: &str,
        cache: &TtlCache<T>,
        diagnostics: &FetchDiagnostics,
    ) -> Result<Resolved<T>, MarketDataError> {
        if let Some(entry) = cache.get_any(symbol) {
            warn!(
                "All providers failed for {} [{}], serving stale value from {} fetched at {}",
                symbol,
                diagnostics.summary(),
                entry.source,
                entry.fetched_at
            );
            return Ok(Resolved::stale(entry.value, entry.fetched_at));
        }

        if diagnostics.attempts.is_empty() {
            warn!("No providers available for {}", symbol);
            return Err(MarketDataError::NoProvidersAvailable);
        }

        warn!("No data available for {} [{}]", symbol, diagnostics.summary());
        Err(MarketDataError::NoDataAvailable {
            symbol: symbol.to_string(),
            failures: diagnostics.failures(),
        })
    }

    /// Single-symbol waterfall shared by prices and fundamentals.
    ///
    /// With a `deadline`, each attempt gets only the time left and providers
    /// not reached in time are recorded as skipped. The cached value still
    /// backs the result once the deadline fires.
    async fn waterfall<T, F, Fut>(
        &self,
        symbol: &str,
        providers: &[Arc<dyn MarketDataProvider>],
        cache: &TtlCache<T>,
        deadline: Option<Instant>,
        fetch: F,
    ) -> Result<Resolved<T>, MarketDataError>
    where
        T: Clone,
        F: Fn(Arc<dyn MarketDataProvider>) -> Fut,
        Fut: Future<Output = Result<T, MarketDataError>>,
    {
        if let Some(entry) = cache.get_fresh(symbol) {
            debug!("Cache hit for {} ({})", symbol, entry.source);
            return Ok(Resolved::cached(entry.value, entry.source, entry.fetched_at));
        }

        let started = Instant::now();
        let mut diagnostics = FetchDiagnostics::new();

        for provider in providers {
            let provider_id = provider.id();

            let remaining = match deadline {
                Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                    Some(left) if !left.is_zero() => Some(left),
                    _ => {
                        diagnostics.record_skip(Cow::Borrowed(provider_id), SkipReason::DeadlineReached);
                        continue;
                    }
                },
                None => None,
            };

            if !self.breaker.allow_request(provider_id).await {
                diagnostics.record_skip(Cow::Borrowed(provider_id), SkipReason::CircuitBreakerOpen);
                continue;
            }

            let result = match remaining {
                Some(left) => match tokio::time::timeout(left, fetch(provider.clone())).await {
                    Ok(result) => result,
                    Err(_) => {
                        // The caller ran out of time, not the provider
                        debug!("Deadline reached waiting on '{}' for {}", provider_id, symbol);
                        diagnostics.record_skip(Cow::Borrowed(provider_id), SkipReason::DeadlineReached);
                        continue;
                    }
                },
                None => fetch(provider.clone()).await,
            };

            match result {
                Ok(value) => {
                    self.breaker.record_success(provider_id).await;
                    let fetched_at = Utc::now();
                    cache.insert_at(symbol, value.clone(), provider_id, fetched_at);
                    debug!("Resolved {} from '{}'", symbol, provider_id);
                    return Ok(Resolved::live(value, provider_id, fetched_at));
                }
                Err(e) => {
                    self.breaker.record_error(provider_id, &e).await;
                    Self::note_failure(&mut diagnostics, provider_id, e);
                }
            }
        }

        match Self::fall_back(symbol, cache, &diagnostics) {
            Err(_) if diagnostics.deadline_reached() => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!("Resolving {} exceeded its deadline after {}ms", symbol, elapsed_ms);
                Err(MarketDataError::DeadlineExceeded {
                    symbol: symbol.to_string(),
                    elapsed_ms,
                })
            }
            outcome => outcome,
        }
    }

    async fn resolve_price(
        &self,
        symbol: &str,
        deadline: Option<Instant>,
    ) -> Result<ResolvedQuote, MarketDataError> {
        let registry = &self.registry;
        self.waterfall(
            symbol,
            registry.providers(),
            &self.quotes,
            deadline,
            |provider| async move { registry.fetch_price(provider.as_ref(), symbol).await },
        )
        .await
    }

    /// Resolve the latest price for a symbol.
    pub async fn get_price(&self, symbol: &str) -> Result<ResolvedQuote, MarketDataError> {
        self.resolve_price(symbol, None).await
    }

    /// Resolve a price, giving up once `deadline` has passed.
    ///
    /// An in-flight provider call is dropped when the deadline fires. The last
    /// cached value is served as stale if there is one, otherwise the result
    /// is `DeadlineExceeded`.
    pub async fn get_price_within(
        &self,
        symbol: &str,
        deadline: Duration,
    ) -> Result<ResolvedQuote, MarketDataError> {
        self.resolve_price(symbol, Some(Instant::now() + deadline)).await
    }

    /// Resolve fundamentals through providers that serve them.
    pub async fn get_fundamentals(
        &self,
        symbol: &str,
    ) -> Result<Resolved<Fundamentals>, MarketDataError> {
        let registry = &self.registry;
        let providers = registry.fundamentals_providers();
        self.waterfall(symbol, &providers, &self.fundamentals, None, |provider| async move {
            registry.fetch_fundamentals(provider.as_ref(), symbol).await
        })
        .await
    }

    /// Resolve prices for many symbols.
    ///
    /// Each symbol gets the same contract as [`get_price`](Self::get_price).
    /// Bulk-capable providers are asked once per chunk of outstanding symbols;
    /// other providers are asked per symbol under `strategy`.
    pub async fn get_prices(&self, symbols: &[String], strategy: FetchStrategy) -> BatchResults {
        let mut results = BatchResults::new();
        let mut seen = HashSet::new();
        let mut pending: Vec<String> = Vec::new();

        for symbol in symbols {
            if !seen.insert(symbol.as_str()) {
                continue;
            }
            match self.quotes.get_fresh(symbol) {
                Some(entry) => {
                    results.insert(
                        symbol.clone(),
                        Ok(Resolved::cached(entry.value, entry.source, entry.fetched_at)),
                    );
                }
                None => pending.push(symbol.clone()),
            }
        }

        let mut diagnostics: HashMap<String, FetchDiagnostics> = pending
            .iter()
            .map(|s| (s.clone(), FetchDiagnostics::new()))
            .collect();

        for provider in self.registry.providers() {
            if pending.is_empty() {
                break;
            }

            let resolved = if provider.capabilities().supports_bulk {
                self.bulk_attempt(provider, &pending, &mut diagnostics).await
            } else {
                self.per_symbol_attempt(provider, &pending, strategy, &mut diagnostics)
                    .await
            };

            for (symbol, quote) in resolved {
                let fetched_at = Utc::now();
                self.quotes.insert_at(&symbol, quote.clone(), provider.id(), fetched_at);
                results.insert(symbol, Ok(Resolved::live(quote, provider.id(), fetched_at)));
            }
            pending.retain(|s| !results.contains_key(s));
        }

        for symbol in pending {
            let diag = diagnostics.remove(&symbol).unwrap_or_default();
            let outcome = Self::fall_back(&symbol, &self.quotes, &diag);
            results.insert(symbol, outcome);
        }

        info!(
            "Resolved {}/{} symbols",
            results.values().filter(|r| r.is_ok()).count(),
            results.len()
        );
        results
    }

    /// Ask a bulk-capable provider for the outstanding symbols, chunk by chunk.
    async fn bulk_attempt(
        &self,
        provider: &Arc<dyn MarketDataProvider>,
        pending: &[String],
        diagnostics: &mut HashMap<String, FetchDiagnostics>,
    ) -> Vec<(String, Quote)> {
        let provider_id = provider.id();
        let batch_size = provider.capabilities().max_batch_size.max(1);
        let mut resolved = Vec::new();

        for chunk in pending.chunks(batch_size) {
            if !self.breaker.allow_request(provider_id).await {
                for symbol in chunk {
                    if let Some(diag) = diagnostics.get_mut(symbol) {
                        diag.record_skip(Cow::Borrowed(provider_id), SkipReason::CircuitBreakerOpen);
                    }
                }
                continue;
            }

            debug!("Bulk fetching {} symbols from '{}'", chunk.len(), provider_id);
            match self.registry.fetch_prices(provider.as_ref(), chunk).await {
                Ok(mut quotes) => {
                    let mut penalty: Option<MarketDataError> = None;
                    let before = resolved.len();

                    for symbol in chunk {
                        let result = quotes
                            .remove(symbol)
                            .unwrap_or_else(|| Err(MarketDataError::not_found(provider_id, symbol)));
                        match result {
                            Ok(quote) => resolved.push((symbol.clone(), quote)),
                            Err(e) => {
                                if penalty.is_none()
                                    && e.retry_class() != RetryClass::NextProvider
                                {
                                    penalty = Some(e.clone());
                                }
                                if let Some(diag) = diagnostics.get_mut(symbol) {
                                    Self::note_failure(diag, provider_id, e);
                                }
                            }
                        }
                    }

                    if resolved.len() > before {
                        self.breaker.record_success(provider_id).await;
                    } else if let Some(e) = penalty {
                        self.breaker.record_error(provider_id, &e).await;
                    }
                }
                Err(e) => {
                    // One failed call is one breaker failure, however many symbols it carried
                    self.breaker.record_error(provider_id, &e).await;
                    for symbol in chunk {
                        if let Some(diag) = diagnostics.get_mut(symbol) {
                            Self::note_failure(diag, provider_id, e.clone());
                        }
                    }
                }
            }
        }

        resolved
    }

    /// Ask a provider about each outstanding symbol separately.
    async fn per_symbol_attempt(
        &self,
        provider: &Arc<dyn MarketDataProvider>,
        pending: &[String],
        strategy: FetchStrategy,
        diagnostics: &mut HashMap<String, FetchDiagnostics>,
    ) -> Vec<(String, Quote)> {
        let provider_id = provider.id();

        let attempts: Vec<(String, Attempt)> = stream::iter(pending.iter().cloned())
            .map(|symbol| async move {
                // Checked per symbol so a circuit opened mid-batch stops further calls
                if !self.breaker.allow_request(provider_id).await {
                    return (symbol, Attempt::Skipped(SkipReason::CircuitBreakerOpen));
                }
                let result = self.registry.fetch_price(provider.as_ref(), &symbol).await;
                match &result {
                    Ok(_) => self.breaker.record_success(provider_id).await,
                    Err(e) => self.breaker.record_error(provider_id, e).await,
                }
                (symbol, Attempt::Fetched(result))
            })
            .buffer_unordered(strategy.parallelism())
            .collect()
            .await;

        let mut resolved = Vec::new();
        for (symbol, attempt) in attempts {
            match attempt {
                Attempt::Fetched(Ok(quote)) => resolved.push((symbol, quote)),
                Attempt::Fetched(Err(e)) => {
                    if let Some(diag) = diagnostics.get_mut(&symbol) {
                        Self::note_failure(diag, provider_id, e);
                    }
                }
                Attempt::Skipped(reason) => {
                    if let Some(diag) = diagnostics.get_mut(&symbol) {
                        diag.record_skip(Cow::Borrowed(provider_id), reason);
                    }
                }
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use crate::models::CACHE_SOURCE;
    use crate::registry::{CircuitBreakerConfig, ProviderRegistration};
    use crate::testing::{MockProvider, Script};
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    fn resolver_with(
        providers: Vec<Arc<MockProvider>>,
        config: ResolverConfig,
    ) -> WaterfallResolver {
        let registrations = providers
            .into_iter()
            .map(|p| ProviderRegistration::new(p))
            .collect();
        WaterfallResolver::new(
            Arc::new(ProviderRegistry::new(registrations)),
            Arc::new(CircuitBreaker::new()),
            config,
        )
    }

    fn resolver(providers: Vec<Arc<MockProvider>>) -> WaterfallResolver {
        resolver_with(providers, ResolverConfig::default())
    }

    fn no_cache() -> ResolverConfig {
        ResolverConfig {
            quote_ttl: Duration::ZERO,
            fundamentals_ttl: Duration::ZERO,
        }
    }

    fn http_error(id: &str) -> MarketDataError {
        MarketDataError::Http {
            provider: id.to_string(),
            status: 503,
            message: "Service Unavailable".to_string(),
        }
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_falls_through_to_first_success() {
        let a = Arc::new(MockProvider::failing("A", 1, http_error("A")));
        let b = Arc::new(MockProvider::failing("B", 2, MockProvider::timeout_error("B")));
        let c = Arc::new(MockProvider::price("C", 3, dec!(101.5)));
        let resolver = resolver(vec![a.clone(), b.clone(), c.clone()]);

        let resolved = resolver.get_price("AAPL").await.unwrap();

        assert_eq!(resolved.source, "C");
        assert_eq!(resolved.value.price, dec!(101.5));
        assert!(!resolved.cached);
        assert!(!resolved.stale);
        assert_eq!(resolver.breaker().state("A").await.consecutive_failures, 1);
        assert_eq!(resolver.breaker().state("B").await.consecutive_failures, 1);
        assert_eq!(c.calls(), 1);
    }

    #[tokio::test]
    async fn test_fresh_cache_short_circuits_providers() {
        let a = Arc::new(MockProvider::price("A", 1, dec!(10)));
        let resolver = resolver(vec![a.clone()]);

        resolver.get_price("AAPL").await.unwrap();
        let second = resolver.get_price("AAPL").await.unwrap();

        assert!(second.cached);
        assert!(!second.stale);
        assert_eq!(second.source, "A");
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_cache_served_when_all_fail() {
        let a = Arc::new(MockProvider::failing("A", 1, http_error("A")));
        let b = Arc::new(MockProvider::failing("B", 2, http_error("B")));
        let resolver = resolver_with(
            vec![a, b],
            ResolverConfig {
                quote_ttl: Duration::from_secs(5),
                ..Default::default()
            },
        );
        let fetched_at = Utc::now() - ChronoDuration::seconds(60);
        resolver.quote_cache().insert_at(
            "AAPL",
            Quote::new("AAPL", dec!(99), fetched_at, "A"),
            "A",
            fetched_at,
        );

        let resolved = resolver.get_price("AAPL").await.unwrap();

        assert!(resolved.stale);
        assert!(resolved.cached);
        assert_eq!(resolved.source, CACHE_SOURCE);
        assert_eq!(resolved.value.price, dec!(99));
        assert_eq!(resolved.fetched_at, fetched_at);
    }

    #[tokio::test]
    async fn test_no_data_names_every_failed_source() {
        let a = Arc::new(MockProvider::failing("A", 1, http_error("A")));
        let b = Arc::new(MockProvider::failing(
            "B",
            2,
            MarketDataError::Entitlement {
                provider: "B".to_string(),
                message: "premium endpoint".to_string(),
            },
        ));
        let resolver = resolver(vec![a, b]);

        match resolver.get_price("AAPL").await {
            Err(MarketDataError::NoDataAvailable { symbol, failures }) => {
                assert_eq!(symbol, "AAPL");
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].provider, "A");
                assert_eq!(failures[0].kind, FailureKind::HttpError);
                assert_eq!(failures[1].provider, "B");
                assert_eq!(failures[1].kind, FailureKind::Entitlement);
            }
            other => panic!("expected NoDataAvailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_providers() {
        let resolver = resolver(vec![]);
        assert!(matches!(
            resolver.get_price("AAPL").await,
            Err(MarketDataError::NoProvidersAvailable)
        ));
    }

    #[tokio::test]
    async fn test_entitlement_failure_disables_provider() {
        let a = Arc::new(MockProvider::failing(
            "A",
            1,
            MarketDataError::Entitlement {
                provider: "A".to_string(),
                message: "NOT_AUTHORIZED".to_string(),
            },
        ));
        let b = Arc::new(MockProvider::price("B", 2, dec!(10)));
        let resolver = resolver_with(vec![a.clone(), b], no_cache());

        resolver.get_price("AAPL").await.unwrap();
        let state = resolver.breaker().state("A").await;
        assert!(state.entitlement_blocked);
        assert!(state.opened_at.is_some());

        resolver.get_price("AAPL").await.unwrap();
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn test_not_found_carries_no_penalty() {
        let a = Arc::new(MockProvider::new("A", 1, Script::PerSymbol(HashMap::new())));
        let b = Arc::new(MockProvider::price("B", 2, dec!(10)));
        let resolver = resolver(vec![a, b]);

        let resolved = resolver.get_price("AAPL").await.unwrap();

        assert_eq!(resolved.source, "B");
        assert_eq!(resolver.breaker().state("A").await.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_open_circuit_is_skipped() {
        let a = Arc::new(MockProvider::failing("A", 1, http_error("A")));
        let b = Arc::new(MockProvider::price("B", 2, dec!(10)));
        let resolver = resolver_with(vec![a.clone(), b.clone()], no_cache());

        for _ in 0..3 {
            resolver.get_price("AAPL").await.unwrap();
        }
        assert!(resolver.breaker().is_open("A").await);

        resolver.get_price("AAPL").await.unwrap();
        assert_eq!(a.calls(), 3);
        assert_eq!(b.calls(), 4);
    }

    #[tokio::test]
    async fn test_success_clears_prior_failures() {
        let a = Arc::new(MockProvider::failing("A", 1, http_error("A")));
        let resolver = resolver_with(vec![a.clone()], no_cache());

        assert!(resolver.get_price("AAPL").await.is_err());
        assert_eq!(resolver.breaker().state("A").await.consecutive_failures, 1);

        a.set_script(Script::Price(dec!(10)));
        resolver.get_price("AAPL").await.unwrap();
        assert_eq!(resolver.breaker().state("A").await.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let slow = Arc::new(
            MockProvider::price("SLOW", 1, dec!(10)).with_delay(Duration::from_millis(500)),
        );
        let resolver = resolver(vec![slow]);

        let err = resolver
            .get_price_within("AAPL", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketDataError::DeadlineExceeded { .. }));
    }

    #[tokio::test]
    async fn test_deadline_serves_stale_cache() {
        let slow = Arc::new(
            MockProvider::price("SLOW", 1, dec!(10)).with_delay(Duration::from_millis(500)),
        );
        let never_reached = Arc::new(MockProvider::price("LATER", 2, dec!(11)));
        let resolver = resolver_with(
            vec![slow, never_reached.clone()],
            ResolverConfig {
                quote_ttl: Duration::from_secs(5),
                ..Default::default()
            },
        );
        let fetched_at = Utc::now() - ChronoDuration::seconds(60);
        resolver.quote_cache().insert_at(
            "AAPL",
            Quote::new("AAPL", dec!(99), fetched_at, "SLOW"),
            "SLOW",
            fetched_at,
        );

        let resolved = resolver
            .get_price_within("AAPL", Duration::from_millis(20))
            .await
            .unwrap();

        assert!(resolved.stale);
        assert_eq!(resolved.source, CACHE_SOURCE);
        assert_eq!(resolved.value.price, dec!(99));
        assert_eq!(never_reached.calls(), 0);
        // Running out of time is not the provider's fault
        assert_eq!(resolver.breaker().state("SLOW").await.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_generous_deadline_resolves_live() {
        let a = Arc::new(MockProvider::failing("A", 1, http_error("A")));
        let b = Arc::new(MockProvider::price("B", 2, dec!(10)));
        let resolver = resolver(vec![a, b]);

        let resolved = resolver
            .get_price_within("AAPL", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(resolved.source, "B");
        assert!(!resolved.stale);
    }

    #[tokio::test]
    async fn test_fundamentals_skip_price_only_providers() {
        let prices_only = Arc::new(MockProvider::price("PRICES", 1, dec!(10)));
        let fundamentals = Arc::new(MockProvider::price("FUND", 2, dec!(25)).with_fundamentals());
        let resolver = resolver(vec![prices_only.clone(), fundamentals]);

        let resolved = resolver.get_fundamentals("AAPL").await.unwrap();

        assert_eq!(resolved.source, "FUND");
        assert_eq!(resolved.value.pe_ratio, Some(dec!(25)));
        assert_eq!(prices_only.calls(), 0);
    }

    #[tokio::test]
    async fn test_bulk_provider_groups_symbols() {
        let bulk = Arc::new(MockProvider::price("BULK", 1, dec!(10)).with_bulk(2));
        let resolver = resolver(vec![bulk.clone()]);

        let results = resolver
            .get_prices(&symbols(&["AAPL", "MSFT", "GOOG"]), FetchStrategy::Sequential)
            .await;

        assert_eq!(results.len(), 3);
        assert!(results.values().all(|r| r.is_ok()));
        assert_eq!(bulk.bulk_calls(), 2);
        assert_eq!(bulk.calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_partial_success() {
        let mut known = HashMap::new();
        known.insert("AAPL".to_string(), dec!(150));
        let bulk = Arc::new(MockProvider::new("BULK", 1, Script::PerSymbol(known)).with_bulk(10));
        let down = Arc::new(MockProvider::failing("DOWN", 2, http_error("DOWN")));
        let resolver = resolver(vec![bulk, down.clone()]);

        let results = resolver
            .get_prices(&symbols(&["AAPL", "NOPE"]), FetchStrategy::concurrent())
            .await;

        let aapl = results["AAPL"].as_ref().unwrap();
        assert_eq!(aapl.source, "BULK");
        match &results["NOPE"] {
            Err(MarketDataError::NoDataAvailable { failures, .. }) => {
                // BULK's miss is reported alongside DOWN's outage
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].kind, FailureKind::NotFound);
                assert_eq!(failures[1].provider, "DOWN");
            }
            other => panic!("expected NoDataAvailable, got {:?}", other),
        }
        assert_eq!(down.calls(), 1);
    }

    #[tokio::test]
    async fn test_batch_uses_cache_and_dedups() {
        let a = Arc::new(MockProvider::price("A", 1, dec!(10)));
        let resolver = resolver(vec![a.clone()]);
        resolver.get_price("AAPL").await.unwrap();

        let results = resolver
            .get_prices(&symbols(&["AAPL", "MSFT", "MSFT"]), FetchStrategy::Sequential)
            .await;

        assert_eq!(results.len(), 2);
        assert!(results["AAPL"].as_ref().unwrap().cached);
        assert!(!results["MSFT"].as_ref().unwrap().cached);
        assert_eq!(a.calls(), 2);
    }

    #[tokio::test]
    async fn test_strategies_agree() {
        let list = symbols(&["AAPL", "MSFT", "GOOG", "AMZN"]);

        for strategy in [FetchStrategy::Sequential, FetchStrategy::Concurrent { max_in_flight: 3 }] {
            let a = Arc::new(MockProvider::price("A", 1, dec!(42)));
            let resolver = resolver(vec![a.clone()]);

            let results = resolver.get_prices(&list, strategy).await;

            assert_eq!(results.len(), 4);
            for symbol in &list {
                assert_eq!(results[symbol].as_ref().unwrap().value.price, dec!(42));
            }
            assert_eq!(a.calls(), 4);
        }
    }

    #[tokio::test]
    async fn test_bulk_call_failure_is_one_breaker_failure() {
        let bulk = Arc::new(MockProvider::failing("BULK", 1, http_error("BULK")).with_bulk(1));
        let fallback = Arc::new(MockProvider::price("FALLBACK", 2, dec!(5)));
        let breaker = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 10,
            ..Default::default()
        })
        .unwrap();
        let resolver = WaterfallResolver::new(
            Arc::new(ProviderRegistry::new(vec![
                ProviderRegistration::new(bulk.clone()),
                ProviderRegistration::new(fallback),
            ])),
            Arc::new(breaker),
            ResolverConfig::default(),
        );

        let results = resolver
            .get_prices(&symbols(&["AAPL", "MSFT"]), FetchStrategy::Sequential)
            .await;

        assert!(results.values().all(|r| r.is_ok()));
        // Batch size 1 means two calls, each one failure
        assert_eq!(bulk.bulk_calls(), 2);
        assert_eq!(resolver.breaker().state("BULK").await.consecutive_failures, 2);
    }
}
