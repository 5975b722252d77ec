//! Verification domain models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderFailure;

/// Variance below which three or more sources count as agreeing.
pub const VERIFIED_VARIANCE: Decimal = dec!(0.005);

/// Variance below which two sources count as agreeing.
pub const PARTIAL_VARIANCE: Decimal = dec!(0.01);

// =============================================================================
// Metric
// =============================================================================

/// A value that can be cross-checked between providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Price,
    MarketCap,
    PeRatio,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Price => "price",
            Metric::MarketCap => "market_cap",
            Metric::PeRatio => "pe_ratio",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Verification Status
// =============================================================================

/// How well the sources agreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Partial,
    Unverified,
    VarianceFlag,
    Failed,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::Partial => "partial",
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::VarianceFlag => "variance_flag",
            VerificationStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status, confidence and fallback level for one verification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub status: VerificationStatus,
    pub confidence: f64,
    /// 0 with three or more sources, rising as sources drop out.
    pub fallback_level: u8,
}

impl Assessment {
    /// Grade a verification from the number of answering sources and their
    /// spread.
    pub fn grade(successes: usize, variance: Decimal) -> Self {
        let (status, confidence, fallback_level) = match successes {
            0 => (VerificationStatus::Failed, 0.0, 3),
            1 => (VerificationStatus::Unverified, 0.50, 2),
            2 if variance < PARTIAL_VARIANCE => (VerificationStatus::Partial, 0.75, 1),
            2 => (VerificationStatus::VarianceFlag, 0.65, 1),
            _ if variance < VERIFIED_VARIANCE => (VerificationStatus::Verified, 0.95, 0),
            _ => (VerificationStatus::VarianceFlag, 0.80, 0),
        };
        Self {
            status,
            confidence,
            fallback_level,
        }
    }
}

// =============================================================================
// Audit
// =============================================================================

/// Immutable record of one verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub audit_id: String,
    pub symbol: String,
    pub metric: Metric,
    /// Providers that answered, aligned with `raw_values`.
    pub sources_used: Vec<String>,
    pub raw_values: Vec<Decimal>,
    /// Providers that were asked (or skipped) and produced nothing.
    pub failed_sources: Vec<ProviderFailure>,
    pub median: Option<Decimal>,
    pub variance: Decimal,
    pub verification_status: VerificationStatus,
    pub confidence: f64,
    pub fallback_level: u8,
    pub timestamp: DateTime<Utc>,
}

/// Result of a verified lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedQuote {
    pub symbol: String,
    pub metric: Metric,
    /// Median of the answering sources. `None` when every source failed.
    pub value: Option<Decimal>,
    pub status: VerificationStatus,
    pub confidence: f64,
    pub fallback_level: u8,
    pub audit: AuditEntry,
}

/// Outcome counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMetrics {
    pub total: u64,
    /// Verified outcomes.
    pub successful: u64,
    /// Partial, variance-flagged and single-source outcomes.
    pub partial: u64,
    pub failed: u64,
}
