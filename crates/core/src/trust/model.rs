//! Trust scoring domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use quorum_market_data::VerifiedQuote;

// =============================================================================
// Trust Category
// =============================================================================

/// Signal families that make up a trust score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustCategory {
    Macro,
    Liquidity,
    Flows,
    Derivatives,
    Microstructure,
}

impl TrustCategory {
    pub const ALL: [TrustCategory; 5] = [
        TrustCategory::Macro,
        TrustCategory::Liquidity,
        TrustCategory::Flows,
        TrustCategory::Derivatives,
        TrustCategory::Microstructure,
    ];

    /// Fixed weight of the category. The weights sum to 1.
    pub fn weight(&self) -> f64 {
        match self {
            TrustCategory::Macro => 0.25,
            TrustCategory::Liquidity => 0.15,
            TrustCategory::Flows => 0.20,
            TrustCategory::Derivatives => 0.25,
            TrustCategory::Microstructure => 0.15,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustCategory::Macro => "macro",
            TrustCategory::Liquidity => "liquidity",
            TrustCategory::Flows => "flows",
            TrustCategory::Derivatives => "derivatives",
            TrustCategory::Microstructure => "microstructure",
        }
    }
}

impl std::str::FromStr for TrustCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        TrustCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("Unknown trust category: {}", s))
    }
}

impl std::fmt::Display for TrustCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Scores
// =============================================================================

/// One category's part of a trust score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScore {
    /// Input value after clamping to [0, 100].
    pub value: f64,
    pub weight: f64,
    /// `value * weight`.
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustScore {
    pub ticker: String,
    pub categories: BTreeMap<TrustCategory, CategoryScore>,
    /// Weighted sum, rounded to two decimals.
    pub total_score: f64,
    pub computed_at: DateTime<Utc>,
}

// =============================================================================
// Confidence Band
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BandLabel {
    High,
    Medium,
    Low,
}

impl BandLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BandLabel::High => "HIGH",
            BandLabel::Medium => "MEDIUM",
            BandLabel::Low => "LOW",
        }
    }
}

impl std::fmt::Display for BandLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 95% band around a score, derived from the ticker's score history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceBand {
    pub score: f64,
    pub margin_of_error: f64,
    pub upper_bound: f64,
    pub lower_bound: f64,
    pub band_label: BandLabel,
    pub std_dev: f64,
    /// History length the band was computed from.
    pub sample_size: usize,
}

/// Everything known about a ticker in one report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullMetrics {
    pub ticker: String,
    pub trust_score: TrustScore,
    pub confidence_band: ConfidenceBand,
    pub verified_price: VerifiedQuote,
    pub generated_at: DateTime<Utc>,
}
