//! Market data service implementation.
//!
//! `MarketDataService` owns one registry, one circuit breaker, the resolver,
//! the verification engine and the trust scorer. It is built once at startup
//! and shared behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};

use quorum_market_data::{
    AlphaVantageProvider, AuditEntry, BatchResults, CircuitBreaker, CircuitMetrics,
    FetchStrategy, FinnhubProvider, FmpProvider, Fundamentals, MarketDataProvider, Metric,
    PolygonProvider, ProviderRegistration, ProviderRegistry, QuoteValidator, RateLimiter,
    Resolved, ResolvedQuote, ResolverConfig, VerificationEngine, VerificationMetrics,
    VerifiedQuote, WaterfallResolver,
};

use crate::config::{Config, ProviderKind, ProviderSetting};
use crate::errors::{ConfigError, Result};
use crate::trust::{ConfidenceBand, FullMetrics, TrustCategory, TrustScore, TrustScorer};

use super::traits::MarketDataServiceTrait;

pub struct MarketDataService {
    registry: Arc<ProviderRegistry>,
    breaker: Arc<CircuitBreaker>,
    resolver: WaterfallResolver,
    verifier: VerificationEngine,
    trust: TrustScorer,
    request_timeout: Duration,
}

impl MarketDataService {
    /// Assemble a service from already-built parts.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        breaker: Arc<CircuitBreaker>,
        resolver_config: ResolverConfig,
        request_timeout: Duration,
    ) -> Self {
        let resolver =
            WaterfallResolver::new(registry.clone(), breaker.clone(), resolver_config);
        let verifier = VerificationEngine::new(registry.clone(), breaker.clone());

        Self {
            registry,
            breaker,
            resolver,
            verifier,
            trust: TrustScorer::new(),
            request_timeout,
        }
    }

    /// Build the provider chain and breaker described by `config`.
    ///
    /// Providers keep their declared order. An enabled provider without an
    /// API key is left out.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let registrations = build_registrations(&config.providers, config.attempt_timeout);
        let registry = Arc::new(ProviderRegistry::with_config(
            registrations,
            RateLimiter::new(),
            QuoteValidator::new(),
            config.attempt_timeout,
        ));
        if registry.is_empty() {
            warn!("No market data providers are configured, only cached values can be served");
        }

        let breaker = CircuitBreaker::connect(config.breaker.clone(), config.redis_url.as_deref())
            .await
            .map_err(ConfigError::from)?;
        info!("Circuit breaker state backend: {}", breaker.backend());

        let resolver_config = ResolverConfig {
            quote_ttl: config.quote_ttl,
            fundamentals_ttl: config.fundamentals_ttl,
        };

        Ok(Self::new(
            registry,
            Arc::new(breaker),
            resolver_config,
            config.request_timeout,
        ))
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

fn build_provider(
    kind: ProviderKind,
    api_key: String,
    timeout: Duration,
) -> Arc<dyn MarketDataProvider> {
    match kind {
        ProviderKind::Finnhub => Arc::new(FinnhubProvider::new(api_key).with_timeout(timeout)),
        ProviderKind::Polygon => Arc::new(PolygonProvider::new(api_key).with_timeout(timeout)),
        ProviderKind::Fmp => Arc::new(FmpProvider::new(api_key).with_timeout(timeout)),
        ProviderKind::AlphaVantage => {
            Arc::new(AlphaVantageProvider::new(api_key).with_timeout(timeout))
        }
    }
}

fn build_registrations(
    settings: &[ProviderSetting],
    timeout: Duration,
) -> Vec<ProviderRegistration> {
    let mut registrations = Vec::with_capacity(settings.len());

    for (index, setting) in settings.iter().enumerate() {
        let Some(api_key) = setting.api_key.clone() else {
            if setting.enabled {
                warn!(
                    "{} is enabled but {} is not set, skipping",
                    setting.kind,
                    setting.kind.api_key_var()
                );
            } else {
                info!("{} is disabled", setting.kind);
            }
            continue;
        };

        let priority = u8::try_from(index + 1).unwrap_or(u8::MAX);
        registrations.push(
            ProviderRegistration::new(build_provider(setting.kind, api_key, timeout))
                .enabled(setting.enabled)
                .with_priority(priority),
        );
    }

    registrations
}

#[async_trait]
impl MarketDataServiceTrait for MarketDataService {
    async fn get_price(&self, symbol: &str) -> Result<ResolvedQuote> {
        self.get_price_within(symbol, self.request_timeout).await
    }

    async fn get_price_within(&self, symbol: &str, deadline: Duration) -> Result<ResolvedQuote> {
        Ok(self.resolver.get_price_within(symbol, deadline).await?)
    }

    async fn get_prices(&self, symbols: &[String], strategy: FetchStrategy) -> BatchResults {
        self.resolver.get_prices(symbols, strategy).await
    }

    async fn get_price_verified(&self, symbol: &str) -> VerifiedQuote {
        self.verifier.verify_price(symbol).await
    }

    async fn verify_metric(&self, symbol: &str, metric: Metric) -> VerifiedQuote {
        self.verifier.verify_metric(symbol, metric).await
    }

    async fn get_fundamentals(&self, symbol: &str) -> Result<Resolved<Fundamentals>> {
        Ok(self.resolver.get_fundamentals(symbol).await?)
    }

    fn compute_trust_score(
        &self,
        ticker: &str,
        categories: &HashMap<TrustCategory, f64>,
    ) -> TrustScore {
        self.trust.compute_trust_score(ticker, categories)
    }

    fn compute_confidence_band(&self, ticker: &str, score: f64) -> ConfidenceBand {
        self.trust.compute_confidence_band(ticker, score)
    }

    async fn generate_full_metrics(
        &self,
        ticker: &str,
        categories: &HashMap<TrustCategory, f64>,
    ) -> FullMetrics {
        let trust_score = self.trust.compute_trust_score(ticker, categories);
        let confidence_band = self
            .trust
            .compute_confidence_band(ticker, trust_score.total_score);
        let verified_price = self.verifier.verify_price(ticker).await;

        FullMetrics {
            ticker: ticker.to_string(),
            trust_score,
            confidence_band,
            verified_price,
            generated_at: Utc::now(),
        }
    }

    fn verification_metrics(&self) -> VerificationMetrics {
        self.verifier.metrics()
    }

    fn recent_audits(&self, limit: usize) -> Vec<AuditEntry> {
        self.verifier.recent_audits(limit)
    }

    async fn provider_health(&self) -> Vec<CircuitMetrics> {
        self.breaker.metrics(&self.registry.provider_ids()).await
    }
}
