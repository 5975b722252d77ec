//! Provider registry for orchestrating market data providers.
//!
//! The registry is built once from a declarative registration list and owns
//! everything that wraps a single provider call:
//! - Enabled flags and priority ordering, resolved at construction
//! - Rate limiting per provider (check before, record after success)
//! - A per-attempt timeout
//! - Quote validation
//!
//! Fallback across providers and circuit breaking live one level up, in the
//! resolver and verification engine.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use super::{QuoteValidator, RateLimiter};
use crate::errors::MarketDataError;
use crate::models::{Fundamentals, Quote};
use crate::provider::{BulkQuotes, MarketDataProvider};

/// Default bound on a single provider call.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(8);

/// One entry of the declarative provider list.
#[derive(Clone)]
pub struct ProviderRegistration {
    pub provider: Arc<dyn MarketDataProvider>,
    pub enabled: bool,
    /// Replaces the provider's own priority when set.
    pub priority_override: Option<u8>,
}

impl ProviderRegistration {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            provider,
            enabled: true,
            priority_override: None,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority_override = Some(priority);
        self
    }
}

/// Provider registry for orchestrating market data fetching.
pub struct ProviderRegistry {
    /// Enabled providers, highest priority first.
    providers: Vec<Arc<dyn MarketDataProvider>>,
    rate_limiter: RateLimiter,
    validator: QuoteValidator,
    attempt_timeout: Duration,
}

impl ProviderRegistry {
    /// Create a new provider registry with default limits and timeout.
    pub fn new(registrations: Vec<ProviderRegistration>) -> Self {
        Self::with_config(
            registrations,
            RateLimiter::new(),
            QuoteValidator::new(),
            DEFAULT_ATTEMPT_TIMEOUT,
        )
    }

    /// Create a registry with custom configuration.
    pub fn with_config(
        registrations: Vec<ProviderRegistration>,
        rate_limiter: RateLimiter,
        validator: QuoteValidator,
        attempt_timeout: Duration,
    ) -> Self {
        let mut enabled: Vec<(u8, Arc<dyn MarketDataProvider>)> = Vec::new();

        for registration in registrations {
            let id = registration.provider.id();
            if !registration.enabled {
                info!("Provider '{}' is disabled, not registering", id);
                continue;
            }
            if enabled.iter().any(|(_, p)| p.id() == id) {
                info!("Provider '{}' registered twice, keeping the first entry", id);
                continue;
            }

            let priority = registration
                .priority_override
                .unwrap_or_else(|| registration.provider.priority());
            rate_limiter.configure(id, registration.provider.rate_limit());
            enabled.push((priority, registration.provider));
        }

        // Stable sort keeps declaration order among equal priorities
        enabled.sort_by_key(|(priority, _)| *priority);

        let providers: Vec<_> = enabled.into_iter().map(|(_, p)| p).collect();
        info!(
            "Provider registry resolved: [{}]",
            providers.iter().map(|p| p.id()).collect::<Vec<_>>().join(", ")
        );

        Self {
            providers,
            rate_limiter,
            validator,
            attempt_timeout,
        }
    }

    /// Enabled providers in priority order.
    pub fn providers(&self) -> &[Arc<dyn MarketDataProvider>] {
        &self.providers
    }

    /// Enabled providers that serve fundamentals, in priority order.
    pub fn fundamentals_providers(&self) -> Vec<Arc<dyn MarketDataProvider>> {
        self.providers
            .iter()
            .filter(|p| p.capabilities().supports_fundamentals)
            .cloned()
            .collect()
    }

    pub fn provider_ids(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Run one provider call under the rate limit and attempt timeout.
    async fn guarded<T, F>(&self, provider: &dyn MarketDataProvider, call: F) -> Result<T, MarketDataError>
    where
        F: std::future::Future<Output = Result<T, MarketDataError>>,
    {
        let id = provider.id();
        self.rate_limiter.check(id)?;

        let result = tokio::time::timeout(self.attempt_timeout, call)
            .await
            .unwrap_or_else(|_| {
                debug!("Provider '{}' exceeded {:?}", id, self.attempt_timeout);
                Err(MarketDataError::Timeout {
                    provider: id.to_string(),
                })
            })?;

        self.rate_limiter.increment(id);
        Ok(result)
    }

    /// Fetch and validate one price from one provider.
    pub async fn fetch_price(
        &self,
        provider: &dyn MarketDataProvider,
        symbol: &str,
    ) -> Result<Quote, MarketDataError> {
        let quote = self.guarded(provider, provider.fetch_price(symbol)).await?;
        self.validator.validate(&quote)?;
        Ok(quote)
    }

    /// Fetch several prices from one provider in a single call.
    ///
    /// Quotes that fail validation are replaced by their validation error.
    pub async fn fetch_prices(
        &self,
        provider: &dyn MarketDataProvider,
        symbols: &[String],
    ) -> Result<BulkQuotes, MarketDataError> {
        let mut results = self.guarded(provider, provider.fetch_prices(symbols)).await?;
        for result in results.values_mut() {
            if let Ok(quote) = result {
                if let Err(e) = self.validator.validate(quote) {
                    *result = Err(e);
                }
            }
        }
        Ok(results)
    }

    /// Fetch fundamentals from one provider.
    pub async fn fetch_fundamentals(
        &self,
        provider: &dyn MarketDataProvider,
        symbol: &str,
    ) -> Result<Fundamentals, MarketDataError> {
        let fundamentals = self
            .guarded(provider, provider.fetch_fundamentals(symbol))
            .await?;
        if fundamentals.is_empty() {
            return Err(MarketDataError::not_found(provider.id(), symbol));
        }
        Ok(fundamentals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RateLimit;
    use crate::testing::MockProvider;
    use rust_decimal_macros::dec;

    fn registration(provider: MockProvider) -> ProviderRegistration {
        ProviderRegistration::new(Arc::new(provider))
    }

    #[test]
    fn test_provider_ordering_by_priority() {
        let registry = ProviderRegistry::new(vec![
            registration(MockProvider::price("LOW_PRIORITY", 20, dec!(1))),
            registration(MockProvider::price("HIGH_PRIORITY", 5, dec!(1))),
            registration(MockProvider::price("MED_PRIORITY", 10, dec!(1))),
        ]);

        assert_eq!(
            registry.provider_ids(),
            vec!["HIGH_PRIORITY", "MED_PRIORITY", "LOW_PRIORITY"]
        );
    }

    #[test]
    fn test_disabled_providers_are_dropped() {
        let registry = ProviderRegistry::new(vec![
            registration(MockProvider::price("A", 1, dec!(1))),
            registration(MockProvider::price("B", 2, dec!(1))).enabled(false),
        ]);

        assert_eq!(registry.provider_ids(), vec!["A"]);
    }

    #[test]
    fn test_priority_override_and_stable_ties() {
        let registry = ProviderRegistry::new(vec![
            registration(MockProvider::price("A", 1, dec!(1))).with_priority(9),
            registration(MockProvider::price("B", 5, dec!(1))),
            registration(MockProvider::price("C", 5, dec!(1))),
        ]);

        assert_eq!(registry.provider_ids(), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_fundamentals_providers_filter() {
        let registry = ProviderRegistry::new(vec![
            registration(MockProvider::price("PRICES_ONLY", 1, dec!(1))),
            registration(MockProvider::price("FUNDAMENTALS", 2, dec!(1)).with_fundamentals()),
        ]);

        let ids: Vec<_> = registry
            .fundamentals_providers()
            .iter()
            .map(|p| p.id())
            .collect();
        assert_eq!(ids, vec!["FUNDAMENTALS"]);
    }

    #[tokio::test]
    async fn test_fetch_counts_against_budget_only_on_success() {
        let provider = Arc::new(
            MockProvider::price("BUDGET", 1, dec!(10)).with_rate_limit(RateLimit::per_minute(1)),
        );
        let registry = ProviderRegistry::new(vec![ProviderRegistration::new(provider.clone())]);

        registry.fetch_price(provider.as_ref(), "AAPL").await.unwrap();
        assert_eq!(registry.rate_limiter().remaining("BUDGET"), 0);

        let err = registry.fetch_price(provider.as_ref(), "AAPL").await.unwrap_err();
        assert!(matches!(err, MarketDataError::RateLimitExceeded { .. }));
        // The budget check short-circuits before calling the provider
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_call_does_not_consume_budget() {
        let provider = Arc::new(
            MockProvider::failing("FLAKY", 1, MockProvider::timeout_error("FLAKY"))
                .with_rate_limit(RateLimit::per_minute(1)),
        );
        let registry = ProviderRegistry::new(vec![ProviderRegistration::new(provider.clone())]);

        assert!(registry.fetch_price(provider.as_ref(), "AAPL").await.is_err());
        assert_eq!(registry.rate_limiter().remaining("FLAKY"), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let provider = Arc::new(
            MockProvider::price("SLOW", 1, dec!(10)).with_delay(Duration::from_millis(200)),
        );
        let registry = ProviderRegistry::with_config(
            vec![ProviderRegistration::new(provider.clone())],
            RateLimiter::new(),
            QuoteValidator::new(),
            Duration::from_millis(20),
        );

        let err = registry.fetch_price(provider.as_ref(), "AAPL").await.unwrap_err();
        assert!(matches!(err, MarketDataError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_zero_price_fails_validation() {
        let provider = Arc::new(MockProvider::price("ZERO", 1, dec!(0)));
        let registry = ProviderRegistry::new(vec![ProviderRegistration::new(provider.clone())]);

        let err = registry.fetch_price(provider.as_ref(), "AAPL").await.unwrap_err();
        assert!(matches!(err, MarketDataError::ValidationFailed { .. }));
    }
}
