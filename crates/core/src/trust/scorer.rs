//! Weighted trust scores and confidence bands.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use log::{debug, warn};

use super::model::{BandLabel, CategoryScore, ConfidenceBand, TrustCategory, TrustScore};

/// Value assumed for a category with no input.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Scores kept per ticker before the oldest is evicted.
pub const HISTORY_CAPACITY: usize = 100;

/// Below this many points the default standard deviation is used.
pub const MIN_HISTORY_FOR_STD_DEV: usize = 5;

pub const DEFAULT_STD_DEV: f64 = 10.0;

/// Two-sided 95% z-score.
const Z_95: f64 = 1.96;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return NEUTRAL_SCORE;
    }
    value.clamp(0.0, 100.0)
}

/// Sample standard deviation (n - 1).
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (n - 1.0)).sqrt()
}

pub struct TrustScorer {
    history: RwLock<HashMap<String, VecDeque<f64>>>,
    capacity: usize,
}

impl TrustScorer {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn read_history(&self) -> RwLockReadGuard<'_, HashMap<String, VecDeque<f64>>> {
        self.history.read().unwrap_or_else(|poisoned| {
            warn!("Trust history lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_history(&self) -> RwLockWriteGuard<'_, HashMap<String, VecDeque<f64>>> {
        self.history.write().unwrap_or_else(|poisoned| {
            warn!("Trust history lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Weighted sum of the category values.
    ///
    /// Missing categories count as [`NEUTRAL_SCORE`]; values are clamped to
    /// [0, 100]. Does not touch the history.
    pub fn compute_trust_score(
        &self,
        ticker: &str,
        categories: &HashMap<TrustCategory, f64>,
    ) -> TrustScore {
        let mut breakdown = BTreeMap::new();
        let mut total = 0.0;

        for category in TrustCategory::ALL {
            let value = categories
                .get(&category)
                .copied()
                .map(clamp_score)
                .unwrap_or(NEUTRAL_SCORE);
            let weight = category.weight();
            let contribution = value * weight;
            total += contribution;
            breakdown.insert(
                category,
                CategoryScore {
                    value,
                    weight,
                    contribution: round2(contribution),
                },
            );
        }

        let total_score = round2(total).clamp(0.0, 100.0);
        debug!("Trust score for {}: {}", ticker, total_score);

        TrustScore {
            ticker: ticker.to_string(),
            categories: breakdown,
            total_score,
            computed_at: Utc::now(),
        }
    }

    /// Record `score` in the ticker's history and band it.
    pub fn compute_confidence_band(&self, ticker: &str, score: f64) -> ConfidenceBand {
        let score = clamp_score(score);

        let samples: Vec<f64> = {
            let mut history = self.write_history();
            let entries = history.entry(ticker.to_string()).or_default();
            entries.push_back(score);
            while entries.len() > self.capacity {
                entries.pop_front();
            }
            entries.iter().copied().collect()
        };

        let std_dev = if samples.len() < MIN_HISTORY_FOR_STD_DEV {
            DEFAULT_STD_DEV
        } else {
            sample_std_dev(&samples)
        };
        let margin = Z_95 * std_dev;

        let band_label = if score >= 80.0 && std_dev < 10.0 {
            BandLabel::High
        } else if score >= 50.0 && std_dev < 15.0 {
            BandLabel::Medium
        } else {
            BandLabel::Low
        };

        ConfidenceBand {
            score: round2(score),
            margin_of_error: round2(margin),
            upper_bound: round2((score + margin).min(100.0)),
            lower_bound: round2((score - margin).max(0.0)),
            band_label,
            std_dev: round2(std_dev),
            sample_size: samples.len(),
        }
    }

    /// Scores recorded for a ticker, oldest first.
    pub fn history(&self, ticker: &str) -> Vec<f64> {
        self.read_history()
            .get(ticker)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Default for TrustScorer {
    fn default() -> Self {
        Self::new()
    }
}
