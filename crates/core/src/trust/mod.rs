//! Trust scoring: weighted category scores and history-based confidence bands.

mod model;
mod scorer;

pub use model::{BandLabel, CategoryScore, ConfidenceBand, FullMetrics, TrustCategory, TrustScore};
pub use scorer::{
    sample_std_dev, TrustScorer, DEFAULT_STD_DEV, HISTORY_CAPACITY, MIN_HISTORY_FOR_STD_DEV,
    NEUTRAL_SCORE,
};
