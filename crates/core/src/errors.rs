//! Core error types for Quorum.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use quorum_market_data::registry::BreakerConfigError;
use quorum_market_data::{MarketDataError, ProviderFailure};

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the core crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Market data operation failed: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Errors raised while reading configuration from the environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("Provider '{0}' listed more than once")]
    DuplicateProvider(String),

    #[error("Invalid circuit breaker settings: {0}")]
    Breaker(#[from] BreakerConfigError),
}

/// Structured error body handed to callers in place of a value.
///
/// Names every source that failed so the caller can tell an outage from an
/// unknown symbol. Never carries a substitute price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ProviderFailure>,
}

impl From<&MarketDataError> for ErrorPayload {
    fn from(error: &MarketDataError) -> Self {
        let (code, symbol, failures) = match error {
            MarketDataError::NoDataAvailable { symbol, failures } => {
                ("no_data_available", Some(symbol.clone()), failures.clone())
            }
            MarketDataError::DeadlineExceeded { symbol, .. } => {
                ("deadline_exceeded", Some(symbol.clone()), Vec::new())
            }
            MarketDataError::NoProvidersAvailable => ("no_providers_available", None, Vec::new()),
            other => (
                "provider_error",
                None,
                other.to_failure().into_iter().collect(),
            ),
        };
        Self {
            code: code.to_string(),
            message: error.to_string(),
            symbol,
            failures,
        }
    }
}
