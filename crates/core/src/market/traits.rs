//! Service trait for market data access.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use quorum_market_data::{
    AuditEntry, BatchResults, CircuitMetrics, FetchStrategy, Fundamentals, Metric, Resolved,
    ResolvedQuote, VerificationMetrics, VerifiedQuote,
};

use crate::errors::Result;
use crate::trust::{ConfidenceBand, FullMetrics, TrustCategory, TrustScore};

/// Everything a caller can ask of Quorum.
#[async_trait]
pub trait MarketDataServiceTrait: Send + Sync {
    /// Resolve a price within the configured request timeout.
    async fn get_price(&self, symbol: &str) -> Result<ResolvedQuote>;

    /// Resolve a price within a caller-chosen deadline.
    async fn get_price_within(&self, symbol: &str, deadline: Duration) -> Result<ResolvedQuote>;

    /// Resolve many prices. Each symbol succeeds or fails on its own.
    async fn get_prices(&self, symbols: &[String], strategy: FetchStrategy) -> BatchResults;

    /// Ask every provider for the price and grade their agreement.
    async fn get_price_verified(&self, symbol: &str) -> VerifiedQuote;

    async fn verify_metric(&self, symbol: &str, metric: Metric) -> VerifiedQuote;

    async fn get_fundamentals(&self, symbol: &str) -> Result<Resolved<Fundamentals>>;

    fn compute_trust_score(
        &self,
        ticker: &str,
        categories: &HashMap<TrustCategory, f64>,
    ) -> TrustScore;

    /// Record `score` in the ticker's history and return its band.
    fn compute_confidence_band(&self, ticker: &str, score: f64) -> ConfidenceBand;

    /// Trust score, confidence band and verified price in one report.
    async fn generate_full_metrics(
        &self,
        ticker: &str,
        categories: &HashMap<TrustCategory, f64>,
    ) -> FullMetrics;

    fn verification_metrics(&self) -> VerificationMetrics;

    /// Most recent audit records, newest first.
    fn recent_audits(&self, limit: usize) -> Vec<AuditEntry>;

    /// Circuit state of every registered provider.
    async fn provider_health(&self) -> Vec<CircuitMetrics>;
}
