//! Skip reason tracking for provider selection diagnostics.

use crate::errors::{FailureKind, MarketDataError, ProviderFailure};
use crate::models::ProviderId;

/// Why a provider was skipped without being called.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Circuit breaker is open for this provider.
    CircuitBreakerOpen,

    /// Our own call budget for the provider is spent.
    RateLimited,

    /// The caller's deadline passed before this provider's turn.
    DeadlineReached,
}

impl SkipReason {
    /// Failure record naming the skipped provider.
    fn to_failure(&self, provider: &ProviderId) -> ProviderFailure {
        let (kind, message) = match self {
            Self::CircuitBreakerOpen => (FailureKind::CircuitOpen, "Circuit open"),
            Self::RateLimited => (FailureKind::RateLimited, "Local rate limit reached"),
            Self::DeadlineReached => (FailureKind::Timeout, "Deadline reached before attempt"),
        };
        ProviderFailure {
            provider: provider.to_string(),
            kind,
            message: message.to_string(),
        }
    }
}

/// Record of a single provider attempt during a fetch.
#[derive(Clone, Debug)]
pub struct ProviderAttempt {
    pub provider_id: ProviderId,
    pub skipped: Option<SkipReason>,
    pub error: Option<MarketDataError>,
    pub success: bool,
}

/// Detailed result of a fetch operation with skip diagnostics.
#[derive(Clone, Debug, Default)]
pub struct FetchDiagnostics {
    pub attempts: Vec<ProviderAttempt>,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record_skip(&mut self, provider_id: ProviderId, reason: SkipReason) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: Some(reason),
            error: None,
            success: false,
        });
    }

    pub fn record_error(&mut self, provider_id: ProviderId, error: MarketDataError) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: None,
            error: Some(error),
            success: false,
        });
    }

    pub fn record_success(&mut self, provider_id: ProviderId) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: None,
            error: None,
            success: true,
        });
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(|a| {
                if a.success {
                    format!("{}: SUCCESS", a.provider_id)
                } else if let Some(skip) = &a.skipped {
                    format!("{}: SKIPPED ({:?})", a.provider_id, skip)
                } else if let Some(err) = &a.error {
                    format!("{}: ERROR ({})", a.provider_id, err)
                } else {
                    format!("{}: UNKNOWN", a.provider_id)
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// True when the caller's deadline cut the attempt short.
    pub fn deadline_reached(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| a.skipped == Some(SkipReason::DeadlineReached))
    }

    /// Every provider that was a candidate but produced nothing, and why.
    pub fn failures(&self) -> Vec<ProviderFailure> {
        self.attempts
            .iter()
            .filter(|a| !a.success)
            .filter_map(|a| match (&a.skipped, &a.error) {
                (Some(skip), _) => Some(skip.to_failure(&a.provider_id)),
                (None, Some(error)) => error.to_failure().or_else(|| {
                    Some(ProviderFailure {
                        provider: a.provider_id.to_string(),
                        kind: FailureKind::HttpError,
                        message: error.to_string(),
                    })
                }),
                (None, None) => None,
            })
            .collect()
    }
}
