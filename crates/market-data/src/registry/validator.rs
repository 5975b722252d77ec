//! Quote data validation.
//!
//! Validates quote data from providers before it reaches the cache:
//! - Price must be strictly positive (a zero price is never a real quote)
//! - Price must be below a sanity ceiling
//! - Timestamps past the allowed clock skew are rejected
//! - Extreme day moves are suspicious

use chrono::{Duration as ChronoDuration, Utc};
use log::warn;
use rust_decimal::Decimal;

use crate::errors::MarketDataError;
use crate::models::Quote;

/// Validation severity levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSeverity {
    /// Hard failure - reject quote, try next provider.
    Hard,
    /// Soft warning - accept quote but log warning.
    Soft,
}

/// Validation result details.
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    /// Severity of the issue.
    pub severity: ValidationSeverity,
    /// Description of the issue.
    pub message: String,
}

/// Quote validator configuration.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Maximum allowed price value (for sanity check).
    pub max_price: Option<Decimal>,
    /// Reject quotes whose price exceeds `max_price` instead of warning.
    pub reject_above_max: bool,
    /// Allowed clock skew for provider timestamps.
    pub max_future_skew: ChronoDuration,
    /// Day move (in percent) above which a warning is logged.
    pub warn_change_percent: Decimal,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_price: Some(Decimal::from(1_000_000_000i64)), // 1 billion as sanity check
            reject_above_max: false,
            max_future_skew: ChronoDuration::minutes(5),
            warn_change_percent: Decimal::from(50),
        }
    }
}

/// Quote data validator.
pub struct QuoteValidator {
    config: ValidatorConfig,
}

impl QuoteValidator {
    /// Create a new validator with default configuration.
    pub fn new() -> Self {
        Self {
            config: ValidatorConfig::default(),
        }
    }

    /// Create a validator with custom configuration.
    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate a quote.
    ///
    /// Returns Ok(()) if the quote is valid, or `ValidationFailed` naming the
    /// provider if not. Warnings are logged but do not cause rejection.
    pub fn validate(&self, quote: &Quote) -> Result<(), MarketDataError> {
        let mut issues: Vec<ValidationIssue> = Vec::new();

        self.validate_price(quote, &mut issues);
        self.validate_timestamp(quote, &mut issues);
        self.validate_change(quote, &mut issues);

        let errors: Vec<&str> = issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Hard)
            .map(|i| i.message.as_str())
            .collect();

        if !errors.is_empty() {
            return Err(MarketDataError::ValidationFailed {
                provider: quote.source.clone(),
                message: errors.join("; "),
            });
        }

        for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Soft) {
            warn!(
                "Quote validation warning for {} from {}: {}",
                quote.symbol, quote.source, issue.message
            );
        }

        Ok(())
    }

    fn validate_price(&self, quote: &Quote, issues: &mut Vec<ValidationIssue>) {
        if quote.price <= Decimal::ZERO {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Hard,
                message: format!("Non-positive price: {}", quote.price),
            });
            return;
        }

        if let Some(max_price) = self.config.max_price {
            if quote.price > max_price {
                issues.push(ValidationIssue {
                    severity: if self.config.reject_above_max {
                        ValidationSeverity::Hard
                    } else {
                        ValidationSeverity::Soft
                    },
                    message: format!(
                        "Price ({}) exceeds max threshold ({})",
                        quote.price, max_price
                    ),
                });
            }
        }
    }

    fn validate_timestamp(&self, quote: &Quote, issues: &mut Vec<ValidationIssue>) {
        if quote.timestamp > Utc::now() + self.config.max_future_skew {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Hard,
                message: format!("Timestamp {} is in the future", quote.timestamp),
            });
        }
    }

    fn validate_change(&self, quote: &Quote, issues: &mut Vec<ValidationIssue>) {
        if let Some(pct) = quote.change_percent {
            if pct.abs() > self.config.warn_change_percent {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Soft,
                    message: format!("Unusual day move: {}%", pct),
                });
            }
        }
    }
}

impl Default for QuoteValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use rust_decimal_macros::dec;

    fn quote(price: Decimal) -> Quote {
        Quote::new("AAPL", price, Utc::now(), "TEST")
    }

    #[test]
    fn test_valid_quote() {
        let validator = QuoteValidator::new();
        assert!(validator.validate(&quote(dec!(150.25))).is_ok());
    }

    #[test]
    fn test_zero_price_rejected() {
        let validator = QuoteValidator::new();
        let err = validator.validate(&quote(dec!(0))).unwrap_err();
        assert_eq!(err.provider(), Some("TEST"));
        assert_eq!(err.kind(), Some(FailureKind::ParseError));
    }

    #[test]
    fn test_negative_price_rejected() {
        let validator = QuoteValidator::new();
        assert!(validator.validate(&quote(dec!(-1))).is_err());
    }

    #[test]
    fn test_price_above_max_warns_by_default() {
        let validator = QuoteValidator::new();
        assert!(validator.validate(&quote(dec!(2000000000))).is_ok());
    }

    #[test]
    fn test_price_above_max_rejected_when_configured() {
        let validator = QuoteValidator::with_config(ValidatorConfig {
            max_price: Some(dec!(1000)),
            reject_above_max: true,
            ..Default::default()
        });
        assert!(validator.validate(&quote(dec!(1500))).is_err());
    }

    #[test]
    fn test_soft_issues_do_not_reject() {
        let validator = QuoteValidator::new();
        let q = quote(dec!(10)).with_change(Some(dec!(9)), Some(dec!(90)));
        assert!(validator.validate(&q).is_ok());
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let validator = QuoteValidator::new();
        let mut q = quote(dec!(10));
        q.timestamp = Utc::now() + ChronoDuration::hours(2);

        let err = validator.validate(&q).unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::ParseError));
    }

    #[test]
    fn test_small_clock_skew_accepted() {
        let validator = QuoteValidator::new();
        let mut q = quote(dec!(10));
        q.timestamp = Utc::now() + ChronoDuration::minutes(1);
        assert!(validator.validate(&q).is_ok());
    }
}
