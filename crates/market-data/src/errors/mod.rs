//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all market data operations
//! - [`RetryClass`]: Classification for determining retry behavior
//! - [`FailureKind`]: The transport-level failure taxonomy adapters report
//! - [`ProviderFailure`]: A serializable record naming a failed source

mod retry;

pub use retry::RetryClass;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What went wrong talking to a provider, as classified by its adapter.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    HttpError,
    Entitlement,
    ParseError,
    NotFound,
    RateLimited,
    CircuitOpen,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Timeout => "timeout",
            Self::HttpError => "http_error",
            Self::Entitlement => "entitlement",
            Self::ParseError => "parse_error",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::CircuitOpen => "circuit_open",
        };
        f.write_str(label)
    }
}

/// One failed source inside a structured error payload or audit record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Errors that can occur during market data operations.
///
/// Each variant is classified into a [`RetryClass`] via the [`retry_class`](Self::retry_class)
/// method, which determines how the resolver should handle the error.
#[derive(Error, Debug, Clone)]
pub enum MarketDataError {
    /// The provider does not know the requested symbol.
    #[error("Symbol not found: {symbol} ({provider})")]
    SymbolNotFound {
        /// The provider that reported the miss
        provider: String,
        /// The symbol that was requested
        symbol: String,
    },

    /// The provider rate limited the request (HTTP 429 or a rate-limit body).
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// Our own per-provider call budget is spent for the current window.
    #[error("Rate limit exceeded: {provider}")]
    RateLimitExceeded {
        /// The provider whose budget is spent
        provider: String,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The provider answered with a non-success status.
    #[error("HTTP {status} from {provider}: {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    /// The transport failed before a response arrived (DNS, refused connection, TLS).
    #[error("Network error from {provider}: {message}")]
    Network { provider: String, message: String },

    /// The provider refused the request for plan or permission reasons.
    /// These do not clear on their own.
    #[error("Not entitled: {provider} - {message}")]
    Entitlement { provider: String, message: String },

    /// The response body could not be understood, or a required field was absent.
    #[error("Parse error from {provider}: {message}")]
    Parse { provider: String, message: String },

    /// The quote was parsed but failed sanity checks.
    #[error("Validation failed for {provider}: {message}")]
    ValidationFailed { provider: String, message: String },

    /// The provider does not implement the requested operation.
    #[error("{operation} not supported by {provider}")]
    NotSupported { operation: String, provider: String },

    /// No providers are registered and enabled for the request.
    #[error("No providers available")]
    NoProvidersAvailable,

    /// Every provider and the cache were exhausted.
    /// Terminal: never replaced with a fabricated value.
    #[error("No data available for {symbol} ({} sources failed)", failures.len())]
    NoDataAvailable {
        symbol: String,
        failures: Vec<ProviderFailure>,
    },

    /// The caller's overall deadline passed before any source answered.
    #[error("Deadline exceeded resolving {symbol} after {elapsed_ms}ms")]
    DeadlineExceeded { symbol: String, elapsed_ms: u64 },
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::Never`]: Don't retry, the error is terminal
    /// - [`RetryClass::FailoverWithPenalty`]: Next provider, record a breaker failure
    /// - [`RetryClass::Disable`]: Next provider, open the breaker with the entitlement disable
    /// - [`RetryClass::NextProvider`]: Next provider, no penalty
    ///
    /// # Examples
    ///
    /// ```
    /// use quorum_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::RateLimited { provider: "FINNHUB".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::FailoverWithPenalty);
    ///
    /// let error = MarketDataError::Entitlement {
    ///     provider: "POLYGON".to_string(),
    ///     message: "NOT_AUTHORIZED".to_string(),
    /// };
    /// assert_eq!(error.retry_class(), RetryClass::Disable);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Transient provider failures
            Self::RateLimited { .. }
            | Self::Timeout { .. }
            | Self::Http { .. }
            | Self::Network { .. }
            | Self::Parse { .. }
            | Self::ValidationFailed { .. } => RetryClass::FailoverWithPenalty,

            Self::Entitlement { .. } => RetryClass::Disable,

            // This provider can't help, another might
            Self::SymbolNotFound { .. }
            | Self::RateLimitExceeded { .. }
            | Self::NotSupported { .. } => RetryClass::NextProvider,

            // Exhausted all options - terminal
            Self::NoProvidersAvailable
            | Self::NoDataAvailable { .. }
            | Self::DeadlineExceeded { .. } => RetryClass::Never,
        }
    }

    /// Failure kind as seen from the transport, if this error came from a provider.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Timeout { .. } => Some(FailureKind::Timeout),
            Self::Http { .. } | Self::Network { .. } => Some(FailureKind::HttpError),
            Self::Entitlement { .. } => Some(FailureKind::Entitlement),
            Self::Parse { .. } | Self::ValidationFailed { .. } => Some(FailureKind::ParseError),
            Self::SymbolNotFound { .. } => Some(FailureKind::NotFound),
            Self::RateLimited { .. } | Self::RateLimitExceeded { .. } => {
                Some(FailureKind::RateLimited)
            }
            Self::NotSupported { .. }
            | Self::NoProvidersAvailable
            | Self::NoDataAvailable { .. }
            | Self::DeadlineExceeded { .. } => None,
        }
    }

    /// The provider this error is attributed to, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::SymbolNotFound { provider, .. }
            | Self::RateLimited { provider }
            | Self::RateLimitExceeded { provider }
            | Self::Timeout { provider }
            | Self::Http { provider, .. }
            | Self::Network { provider, .. }
            | Self::Entitlement { provider, .. }
            | Self::Parse { provider, .. }
            | Self::ValidationFailed { provider, .. }
            | Self::NotSupported { provider, .. } => Some(provider),
            Self::NoProvidersAvailable
            | Self::NoDataAvailable { .. }
            | Self::DeadlineExceeded { .. } => None,
        }
    }

    /// Build the failure record used in `NoDataAvailable` payloads and audits.
    pub fn to_failure(&self) -> Option<ProviderFailure> {
        Some(ProviderFailure {
            provider: self.provider()?.to_string(),
            kind: self.kind()?,
            message: self.to_string(),
        })
    }

    pub(crate) fn parse(provider: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn not_found(provider: &str, symbol: &str) -> Self {
        Self::SymbolNotFound {
            provider: provider.to_string(),
            symbol: symbol.to_string(),
        }
    }
}
