//! Fetch strategies for resolving several symbols.

use serde::{Deserialize, Serialize};

/// Default concurrency for [`FetchStrategy::Concurrent`].
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// How per-symbol provider calls are scheduled in a batch resolve.
///
/// Bulk-capable providers always get one call per chunk; the strategy only
/// governs providers that must be asked one symbol at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FetchStrategy {
    /// One symbol at a time, in request order.
    Sequential,
    /// Up to `max_in_flight` symbols resolved at once.
    Concurrent { max_in_flight: usize },
}

impl FetchStrategy {
    pub fn concurrent() -> Self {
        Self::Concurrent {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Number of symbols resolved at once under this strategy.
    pub fn parallelism(&self) -> usize {
        match self {
            Self::Sequential => 1,
            Self::Concurrent { max_in_flight } => (*max_in_flight).max(1),
        }
    }
}

impl Default for FetchStrategy {
    fn default() -> Self {
        Self::concurrent()
    }
}
