//! Runtime configuration read from the environment (and `.env` when present).

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use quorum_market_data::CircuitBreakerConfig;
use quorum_market_data::registry::{
    DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_DISABLE_DURATION, DEFAULT_ENTITLEMENT_DISABLE_DURATION,
    DEFAULT_FAILURE_THRESHOLD,
};
use quorum_market_data::resolver::{DEFAULT_FUNDAMENTALS_TTL, DEFAULT_QUOTE_TTL};

use crate::errors::ConfigError;

pub const ENV_PROVIDERS: &str = "QUORUM_PROVIDERS";
pub const ENV_REDIS_URL: &str = "QUORUM_REDIS_URL";
pub const ENV_QUOTE_TTL_SECS: &str = "QUORUM_QUOTE_TTL_SECS";
pub const ENV_FUNDAMENTALS_TTL_SECS: &str = "QUORUM_FUNDAMENTALS_TTL_SECS";
pub const ENV_FAILURE_THRESHOLD: &str = "QUORUM_FAILURE_THRESHOLD";
pub const ENV_DISABLE_SECS: &str = "QUORUM_DISABLE_SECS";
pub const ENV_ENTITLEMENT_DISABLE_SECS: &str = "QUORUM_ENTITLEMENT_DISABLE_SECS";
pub const ENV_ATTEMPT_TIMEOUT_MS: &str = "QUORUM_ATTEMPT_TIMEOUT_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "QUORUM_REQUEST_TIMEOUT_MS";
pub const ENV_WATCHLIST: &str = "QUORUM_WATCHLIST";
pub const ENV_POLL_INTERVAL_SECS: &str = "QUORUM_POLL_INTERVAL_SECS";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Providers this build knows how to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Finnhub,
    Polygon,
    Fmp,
    AlphaVantage,
}

impl ProviderKind {
    /// Default declaration order.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Finnhub,
        ProviderKind::Polygon,
        ProviderKind::Fmp,
        ProviderKind::AlphaVantage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Finnhub => "FINNHUB",
            ProviderKind::Polygon => "POLYGON",
            ProviderKind::Fmp => "FMP",
            ProviderKind::AlphaVantage => "ALPHA_VANTAGE",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            ProviderKind::Finnhub => "FINNHUB_API_KEY",
            ProviderKind::Polygon => "POLYGON_API_KEY",
            ProviderKind::Fmp => "FMP_API_KEY",
            ProviderKind::AlphaVantage => "ALPHA_VANTAGE_API_KEY",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownProvider(s.trim().to_string()))
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of the declared provider list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSetting {
    pub kind: ProviderKind,
    pub enabled: bool,
    pub api_key: Option<String>,
}

pub struct Config {
    /// Providers in declared priority order, disabled ones included.
    pub providers: Vec<ProviderSetting>,
    pub redis_url: Option<String>,
    pub quote_ttl: Duration,
    pub fundamentals_ttl: Duration,
    pub breaker: CircuitBreakerConfig,
    pub attempt_timeout: Duration,
    /// Caller-side deadline for a whole resolve.
    ///
    /// Must cover at least one attempt. It may be shorter than one attempt per
    /// provider, in which case lower-priority providers are skipped once it
    /// fires and a cached value, if any, is served as stale.
    pub request_timeout: Duration,
    pub watchlist: Vec<String>,
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let providers = parse_providers(get(ENV_PROVIDERS).as_deref(), |kind| {
            get(kind.api_key_var())
        })?;

        let breaker = CircuitBreakerConfig {
            failure_threshold: parse_or(&get, ENV_FAILURE_THRESHOLD, DEFAULT_FAILURE_THRESHOLD)?,
            disable_duration: secs_or(&get, ENV_DISABLE_SECS, DEFAULT_DISABLE_DURATION)?,
            entitlement_disable_duration: secs_or(
                &get,
                ENV_ENTITLEMENT_DISABLE_SECS,
                DEFAULT_ENTITLEMENT_DISABLE_DURATION,
            )?,
        };
        breaker.validate()?;

        let watchlist = get(ENV_WATCHLIST)
            .map(|list| {
                list.split(',')
                    .map(|s| s.trim().to_ascii_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let attempt_timeout = millis_or(&get, ENV_ATTEMPT_TIMEOUT_MS, DEFAULT_ATTEMPT_TIMEOUT)?;
        let request_timeout = millis_or(&get, ENV_REQUEST_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT)?;
        if request_timeout < attempt_timeout {
            return Err(ConfigError::InvalidValue {
                key: ENV_REQUEST_TIMEOUT_MS.to_string(),
                value: request_timeout.as_millis().to_string(),
                reason: format!(
                    "must be at least the attempt timeout ({}ms)",
                    attempt_timeout.as_millis()
                ),
            });
        }

        Ok(Self {
            providers,
            redis_url: get(ENV_REDIS_URL),
            quote_ttl: secs_or(&get, ENV_QUOTE_TTL_SECS, DEFAULT_QUOTE_TTL)?,
            fundamentals_ttl: secs_or(&get, ENV_FUNDAMENTALS_TTL_SECS, DEFAULT_FUNDAMENTALS_TTL)?,
            breaker,
            attempt_timeout,
            request_timeout,
            watchlist,
            poll_interval: secs_or(&get, ENV_POLL_INTERVAL_SECS, DEFAULT_POLL_INTERVAL)?,
        })
    }
}

/// Parse a provider list such as `FINNHUB,POLYGON,-FMP`.
///
/// A leading `-` keeps the provider declared but disabled. Without a list all
/// known providers are enabled in default order.
fn parse_providers<K>(list: Option<&str>, api_key: K) -> Result<Vec<ProviderSetting>, ConfigError>
where
    K: Fn(ProviderKind) -> Option<String>,
{
    let entries: Vec<(ProviderKind, bool)> = match list {
        None => ProviderKind::ALL.iter().map(|k| (*k, true)).collect(),
        Some(list) => {
            let mut entries: Vec<(ProviderKind, bool)> = Vec::new();
            for raw in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let (name, enabled) = match raw.strip_prefix('-') {
                    Some(name) => (name, false),
                    None => (raw, true),
                };
                let kind: ProviderKind = name.parse()?;
                if entries.iter().any(|(k, _)| *k == kind) {
                    return Err(ConfigError::DuplicateProvider(kind.to_string()));
                }
                entries.push((kind, enabled));
            }
            entries
        }
    };

    Ok(entries
        .into_iter()
        .map(|(kind, enabled)| ProviderSetting {
            kind,
            enabled,
            api_key: api_key(kind),
        })
        .collect())
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
            reason: e.to_string(),
        }),
    }
}

fn secs_or<G>(get: &G, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default.as_secs()).map(Duration::from_secs)
}

fn millis_or<G>(get: &G, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default.as_millis() as u64).map(Duration::from_millis)
}

/// Lookup over a fixed map, for callers that assemble settings themselves.
pub fn lookup_from(map: HashMap<String, String>) -> impl Fn(&str) -> Option<String> {
    move |key| map.get(key).cloned()
}
