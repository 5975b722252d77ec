use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Company fundamentals from a single provider.
///
/// Every figure is optional: providers differ in coverage and a missing field
/// is left empty rather than defaulted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fundamentals {
    pub symbol: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    /// Market capitalization in absolute currency units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe_ratio: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eps: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dividend_yield: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_52_high: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_52_low: Option<Decimal>,
    pub as_of: DateTime<Utc>,
}

impl Fundamentals {
    pub fn new(symbol: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            source: source.into(),
            as_of: Utc::now(),
            ..Default::default()
        }
    }

    /// True when the provider returned nothing usable.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.market_cap.is_none()
            && self.pe_ratio.is_none()
            && self.eps.is_none()
            && self.sector.is_none()
    }
}
