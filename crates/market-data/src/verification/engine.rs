//! Multi-source verification engine.
//!
//! Unlike the waterfall, verification asks every enabled provider at once and
//! grades how well their answers agree. Each run produces an [`AuditEntry`]
//! kept in a bounded log.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::model::{
    Assessment, AuditEntry, Metric, VerificationMetrics, VerificationStatus, VerifiedQuote,
};
use super::stats;
use crate::errors::MarketDataError;
use crate::provider::MarketDataProvider;
use crate::registry::{CircuitBreaker, FetchDiagnostics, ProviderRegistry, SkipReason};

/// Number of audit entries kept before the oldest is evicted.
pub const AUDIT_LOG_CAPACITY: usize = 100;

/// What one provider contributed to a verification.
enum SourceOutcome {
    Value(Decimal),
    Failed(MarketDataError),
    CircuitOpen,
}

pub struct VerificationEngine {
    registry: Arc<ProviderRegistry>,
    breaker: Arc<CircuitBreaker>,
    audit_log: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
    total: AtomicU64,
    successful: AtomicU64,
    partial: AtomicU64,
    failed: AtomicU64,
}

impl VerificationEngine {
    pub fn new(registry: Arc<ProviderRegistry>, breaker: Arc<CircuitBreaker>) -> Self {
        Self::with_capacity(registry, breaker, AUDIT_LOG_CAPACITY)
    }

    pub fn with_capacity(
        registry: Arc<ProviderRegistry>,
        breaker: Arc<CircuitBreaker>,
        capacity: usize,
    ) -> Self {
        Self {
            registry,
            breaker,
            audit_log: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            partial: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    fn lock_audit_log(&self) -> MutexGuard<'_, VecDeque<AuditEntry>> {
        self.audit_log.lock().unwrap_or_else(|poisoned| {
            warn!("Audit log lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Verify a symbol's price against every provider.
    pub async fn verify_price(&self, symbol: &str) -> VerifiedQuote {
        self.verify_metric(symbol, Metric::Price).await
    }

    /// Verify one metric against every provider able to serve it.
    pub async fn verify_metric(&self, symbol: &str, metric: Metric) -> VerifiedQuote {
        let providers: Vec<Arc<dyn MarketDataProvider>> = match metric {
            Metric::Price => self.registry.providers().to_vec(),
            Metric::MarketCap | Metric::PeRatio => self.registry.fundamentals_providers(),
        };

        let outcomes = join_all(
            providers
                .iter()
                .map(|provider| self.consult(provider.as_ref(), symbol, metric)),
        )
        .await;

        let mut sources_used = Vec::new();
        let mut raw_values = Vec::new();
        let mut diagnostics = FetchDiagnostics::new();

        for (provider, outcome) in providers.iter().zip(outcomes) {
            let id = Cow::Borrowed(provider.id());
            match outcome {
                SourceOutcome::Value(value) => {
                    diagnostics.record_success(id);
                    sources_used.push(provider.id().to_string());
                    raw_values.push(value);
                }
                SourceOutcome::Failed(e) => diagnostics.record_error(id, e),
                SourceOutcome::CircuitOpen => {
                    diagnostics.record_skip(id, SkipReason::CircuitBreakerOpen)
                }
            }
        }

        let median = stats::median(&raw_values);
        let variance = stats::variance(&raw_values);
        let assessment = Assessment::grade(raw_values.len(), variance);

        let audit = AuditEntry {
            audit_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            metric,
            sources_used,
            raw_values,
            failed_sources: diagnostics.failures(),
            median,
            variance,
            verification_status: assessment.status,
            confidence: assessment.confidence,
            fallback_level: assessment.fallback_level,
            timestamp: Utc::now(),
        };

        info!(
            "Verified {} {} -> {} ({} sources, variance {})",
            symbol,
            metric,
            assessment.status,
            audit.sources_used.len(),
            variance
        );
        if assessment.status == VerificationStatus::VarianceFlag {
            warn!(
                "Sources disagree on {} {}: {:?} from {:?}",
                symbol, metric, audit.raw_values, audit.sources_used
            );
        }

        self.count(assessment.status);
        self.append(audit.clone());

        VerifiedQuote {
            symbol: symbol.to_string(),
            metric,
            value: median,
            status: assessment.status,
            confidence: assessment.confidence,
            fallback_level: assessment.fallback_level,
            audit,
        }
    }

    /// Ask one provider for the metric, feeding the outcome to the breaker.
    async fn consult(
        &self,
        provider: &dyn MarketDataProvider,
        symbol: &str,
        metric: Metric,
    ) -> SourceOutcome {
        let id = provider.id();
        if !self.breaker.allow_request(id).await {
            debug!("Circuit open for '{}', counting as failed source", id);
            return SourceOutcome::CircuitOpen;
        }

        let result = match metric {
            Metric::Price => self
                .registry
                .fetch_price(provider, symbol)
                .await
                .map(|quote| quote.price),
            Metric::MarketCap | Metric::PeRatio => self
                .registry
                .fetch_fundamentals(provider, symbol)
                .await
                .and_then(|f| {
                    let value = match metric {
                        Metric::MarketCap => f.market_cap,
                        _ => f.pe_ratio,
                    };
                    value.ok_or_else(|| MarketDataError::not_found(id, symbol))
                }),
        };

        match result {
            Ok(value) => {
                self.breaker.record_success(id).await;
                SourceOutcome::Value(value)
            }
            Err(e) => {
                self.breaker.record_error(id, &e).await;
                SourceOutcome::Failed(e)
            }
        }
    }

    fn count(&self, status: VerificationStatus) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let counter = match status {
            VerificationStatus::Verified => &self.successful,
            VerificationStatus::Partial
            | VerificationStatus::VarianceFlag
            | VerificationStatus::Unverified => &self.partial,
            VerificationStatus::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn append(&self, entry: AuditEntry) {
        let mut log = self.lock_audit_log();
        while log.len() >= self.capacity {
            log.pop_front();
        }
        log.push_back(entry);
    }

    pub fn metrics(&self) -> VerificationMetrics {
        VerificationMetrics {
            total: self.total.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            partial: self.partial.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Most recent audit entries, newest first.
    pub fn recent_audits(&self, limit: usize) -> Vec<AuditEntry> {
        self.lock_audit_log()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn audit_len(&self) -> usize {
        self.lock_audit_log().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use crate::registry::ProviderRegistration;
    use crate::testing::MockProvider;
    use rust_decimal_macros::dec;

    fn engine(providers: Vec<Arc<MockProvider>>) -> VerificationEngine {
        let registrations = providers
            .into_iter()
            .map(|p| ProviderRegistration::new(p))
            .collect();
        VerificationEngine::new(
            Arc::new(ProviderRegistry::new(registrations)),
            Arc::new(CircuitBreaker::new()),
        )
    }

    fn down(id: &'static str, priority: u8) -> Arc<MockProvider> {
        Arc::new(MockProvider::failing(id, priority, MockProvider::timeout_error(id)))
    }

    #[tokio::test]
    async fn test_three_agreeing_sources_verify() {
        let engine = engine(vec![
            Arc::new(MockProvider::price("A", 1, dec!(100))),
            Arc::new(MockProvider::price("B", 2, dec!(100.2))),
            Arc::new(MockProvider::price("C", 3, dec!(100.1))),
        ]);

        let verified = engine.verify_price("AAPL").await;

        assert_eq!(verified.status, VerificationStatus::Verified);
        assert_eq!(verified.confidence, 0.95);
        assert_eq!(verified.value, Some(dec!(100.1)));
        assert_eq!(verified.audit.sources_used, vec!["A", "B", "C"]);
        assert!(verified.audit.failed_sources.is_empty());
    }

    #[tokio::test]
    async fn test_spread_flags_variance() {
        let engine = engine(vec![
            Arc::new(MockProvider::price("A", 1, dec!(100))),
            Arc::new(MockProvider::price("B", 2, dec!(105))),
            Arc::new(MockProvider::price("C", 3, dec!(95))),
        ]);

        let verified = engine.verify_price("AAPL").await;

        assert_eq!(verified.status, VerificationStatus::VarianceFlag);
        assert_eq!(verified.audit.variance, dec!(0.05));
        assert_eq!(verified.value, Some(dec!(100)));
        assert_eq!(verified.fallback_level, 0);
    }

    #[tokio::test]
    async fn test_consults_every_source_even_after_success() {
        let a = Arc::new(MockProvider::price("A", 1, dec!(50)));
        let b = down("B", 2);
        let c = Arc::new(MockProvider::price("C", 3, dec!(50.1)));
        let engine = engine(vec![a.clone(), b.clone(), c.clone()]);

        let verified = engine.verify_price("AAPL").await;

        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
        assert_eq!(c.calls(), 1);
        assert_eq!(verified.status, VerificationStatus::Partial);
        assert_eq!(verified.audit.failed_sources.len(), 1);
        assert_eq!(verified.audit.failed_sources[0].provider, "B");
        assert_eq!(verified.audit.failed_sources[0].kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_all_sources_failed() {
        let engine = engine(vec![down("A", 1), down("B", 2)]);

        let verified = engine.verify_price("AAPL").await;

        assert_eq!(verified.status, VerificationStatus::Failed);
        assert_eq!(verified.value, None);
        assert_eq!(verified.confidence, 0.0);
        assert_eq!(verified.fallback_level, 3);
        assert_eq!(verified.audit.failed_sources.len(), 2);
    }

    #[tokio::test]
    async fn test_open_circuit_counts_as_failed_without_call() {
        let a = Arc::new(MockProvider::price("A", 1, dec!(10)));
        let b = Arc::new(MockProvider::price("B", 2, dec!(10)));
        let engine = engine(vec![a.clone(), b.clone()]);
        engine.breaker.record_entitlement_failure("B").await;

        let verified = engine.verify_price("AAPL").await;

        assert_eq!(b.calls(), 0);
        assert_eq!(verified.status, VerificationStatus::Unverified);
        assert_eq!(verified.audit.failed_sources[0].kind, FailureKind::CircuitOpen);
    }

    #[tokio::test]
    async fn test_failures_feed_the_breaker() {
        let b = down("B", 2);
        let engine = engine(vec![Arc::new(MockProvider::price("A", 1, dec!(10))), b]);

        engine.verify_price("AAPL").await;

        assert_eq!(engine.breaker.state("B").await.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_fundamental_metrics_use_fundamentals_providers() {
        let prices_only = Arc::new(MockProvider::price("PRICES", 1, dec!(10)));
        let f1 = Arc::new(MockProvider::price("F1", 2, dec!(30)).with_fundamentals());
        let f2 = Arc::new(MockProvider::price("F2", 3, dec!(30)).with_fundamentals());
        let engine = engine(vec![prices_only.clone(), f1, f2]);

        let verified = engine.verify_metric("AAPL", Metric::PeRatio).await;

        assert_eq!(prices_only.calls(), 0);
        assert_eq!(verified.metric, Metric::PeRatio);
        assert_eq!(verified.value, Some(dec!(30)));
        assert_eq!(verified.status, VerificationStatus::Partial);
    }

    #[tokio::test]
    async fn test_counters() {
        let failing = engine(vec![down("X", 1)]);
        failing.verify_price("AAPL").await;

        let engine = engine(vec![Arc::new(MockProvider::price("A", 1, dec!(10)))]);
        engine.verify_price("AAPL").await;
        engine.verify_price("MSFT").await;

        assert_eq!(
            engine.metrics(),
            VerificationMetrics {
                total: 2,
                successful: 0,
                partial: 2,
                failed: 0,
            }
        );
        assert_eq!(failing.metrics().failed, 1);
    }

    #[tokio::test]
    async fn test_audit_log_is_bounded() {
        let engine = engine(vec![Arc::new(MockProvider::price("A", 1, dec!(10)))]);

        for i in 0..(AUDIT_LOG_CAPACITY + 1) {
            engine.verify_price(&format!("SYM{}", i)).await;
        }

        assert_eq!(engine.audit_len(), AUDIT_LOG_CAPACITY);
        let recent = engine.recent_audits(AUDIT_LOG_CAPACITY);
        assert_eq!(recent[0].symbol, format!("SYM{}", AUDIT_LOG_CAPACITY));
        // SYM0 was evicted
        assert!(recent.iter().all(|a| a.symbol != "SYM0"));
        assert_eq!(engine.recent_audits(3).len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_verifications_are_all_counted() {
        const CALLERS: usize = 20;
        let engine = Arc::new(engine(vec![
            Arc::new(MockProvider::price("A", 1, dec!(100))),
            Arc::new(MockProvider::price("B", 2, dec!(100.1))),
            Arc::new(MockProvider::price("C", 3, dec!(100.2))),
        ]));

        let tasks = (0..CALLERS).map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.verify_price(&format!("SYM{}", i)).await })
        });
        let verified: Vec<VerifiedQuote> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert!(verified.iter().all(|v| v.status == VerificationStatus::Verified));
        let metrics = engine.metrics();
        assert_eq!(metrics.total, CALLERS as u64);
        assert_eq!(metrics.successful, CALLERS as u64);
        assert_eq!(engine.audit_len(), CALLERS);

        let mut ids: Vec<_> = engine
            .recent_audits(CALLERS)
            .into_iter()
            .map(|a| a.audit_id)
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), CALLERS);
    }
}
