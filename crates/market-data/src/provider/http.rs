//! HTTP plumbing shared by the provider adapters.
//!
//! Every adapter sends plain GET requests and maps the transport outcome the
//! same way:
//!
//! | Outcome | Error |
//! |---------|-------|
//! | transport timeout | `Timeout` |
//! | other transport failure | `Network` |
//! | 429, or a rate-limit message in the body | `RateLimited` |
//! | 401 / 403, or a plan/permission message in the body | `Entitlement` |
//! | 404 | `SymbolNotFound` |
//! | any other non-2xx | `Http { status }` |

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, warn};

use crate::errors::MarketDataError;

/// Default per-request timeout applied to every adapter client.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(8);

/// Longest body excerpt carried in an error message.
const MAX_BODY_EXCERPT: usize = 200;

/// Body fragments providers use when the account plan does not cover a request.
const ENTITLEMENT_MARKERS: &[&str] = &[
    "not entitled",
    "not_authorized",
    "exclusive endpoint",
    "legacy endpoint",
    "premium",
    "subscription",
    "don't have access",
];

/// Body fragments providers use when throttling.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "api call frequency",
    "rate limit",
    "limit reach",
    "too many requests",
];

/// Client shared by an adapter's requests.
///
/// [`send`] sets the timeout on every request as well, so the default client
/// used when the builder fails is still bounded.
pub(crate) fn build_client(timeout: Duration) -> Client {
    Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        warn!("Failed to build HTTP client ({}), falling back to defaults", e);
        Client::new()
    })
}

/// Whether a provider message reports a plan or permission restriction.
pub fn is_entitlement_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    ENTITLEMENT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Whether a provider message reports throttling.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Classify an error message a provider embedded in an otherwise successful response.
///
/// Rate-limit wording wins over entitlement wording: Alpha Vantage's daily cap
/// notice mentions both its limit and its premium plans.
pub(crate) fn classify_message(provider: &str, message: &str) -> MarketDataError {
    if is_rate_limit_message(message) {
        MarketDataError::RateLimited {
            provider: provider.to_string(),
        }
    } else if is_entitlement_message(message) {
        MarketDataError::Entitlement {
            provider: provider.to_string(),
            message: excerpt(message),
        }
    } else {
        MarketDataError::parse(provider, excerpt(message))
    }
}

/// Map a non-success status (and its body) to a typed error.
pub(crate) fn classify_status(
    provider: &str,
    symbol: &str,
    status: StatusCode,
    body: &str,
) -> MarketDataError {
    if status == StatusCode::TOO_MANY_REQUESTS || is_rate_limit_message(body) {
        return MarketDataError::RateLimited {
            provider: provider.to_string(),
        };
    }

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || is_entitlement_message(body)
    {
        return MarketDataError::Entitlement {
            provider: provider.to_string(),
            message: format!("HTTP {} - {}", status.as_u16(), excerpt(body)),
        };
    }

    if status == StatusCode::NOT_FOUND {
        return MarketDataError::not_found(provider, symbol);
    }

    MarketDataError::Http {
        provider: provider.to_string(),
        status: status.as_u16(),
        message: excerpt(body),
    }
}

pub(crate) fn map_send_error(provider: &str, error: reqwest::Error) -> MarketDataError {
    if error.is_timeout() {
        MarketDataError::Timeout {
            provider: provider.to_string(),
        }
    } else {
        MarketDataError::Network {
            provider: provider.to_string(),
            message: format!("Request failed: {}", error.without_url()),
        }
    }
}

/// Send a request and return the body of a successful response.
///
/// `symbol` names what was requested so a 404 can be reported as a symbol miss.
/// `timeout` bounds the whole exchange, body included.
pub(crate) async fn send(
    provider: &str,
    symbol: &str,
    timeout: Duration,
    request: RequestBuilder,
) -> Result<String, MarketDataError> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| map_send_error(provider, e))?;

    let status = response.status();
    debug!("{} responded {} for {}", provider, status, symbol);

    let body = response
        .text()
        .await
        .map_err(|e| map_send_error(provider, e))?;

    if !status.is_success() {
        return Err(classify_status(provider, symbol, status, &body));
    }

    Ok(body)
}

/// Deserialize a response body, mapping failures to `Parse`.
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    provider: &str,
    body: &str,
) -> Result<T, MarketDataError> {
    serde_json::from_str(body)
        .map_err(|e| MarketDataError::parse(provider, format!("Malformed response: {}", e)))
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_BODY_EXCERPT {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX_BODY_EXCERPT).collect();
        format!("{}...", cut)
    }
}
