//! Provider registry module.
//!
//! This module provides orchestration for market data providers, including:
//! - Provider registration and priority ordering
//! - Rate limiting per provider
//! - Circuit breaking with memory or Redis backed state
//! - Quote data validation
//! - Per-request attempt diagnostics

mod circuit_breaker;
mod rate_limiter;
mod provider_registry;
mod skip_reason;
mod store;
mod validator;

pub use circuit_breaker::{
    BreakerConfigError, CircuitBreaker, CircuitBreakerConfig, CircuitMetrics,
    DEFAULT_DISABLE_DURATION, DEFAULT_ENTITLEMENT_DISABLE_DURATION, DEFAULT_FAILURE_THRESHOLD,
};
pub use rate_limiter::RateLimiter;
pub use provider_registry::{ProviderRegistration, ProviderRegistry, DEFAULT_ATTEMPT_TIMEOUT};
pub use skip_reason::{FetchDiagnostics, ProviderAttempt, SkipReason};
pub use store::{
    CircuitState, CircuitStore, MemoryCircuitStore, RedisCircuitStore, StoreError,
    REDIS_CONNECT_TIMEOUT,
};
pub use validator::{QuoteValidator, ValidationIssue, ValidationSeverity, ValidatorConfig};
