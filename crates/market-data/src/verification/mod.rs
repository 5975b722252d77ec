//! Cross-provider verification.
//!
//! This module provides:
//! - Concurrent querying of every provider for one metric
//! - Median and variance across the answers
//! - Status and confidence grading
//! - A bounded audit trail and outcome counters for monitoring

mod engine;
mod model;
pub mod stats;

pub use engine::{VerificationEngine, AUDIT_LOG_CAPACITY};
pub use model::{
    Assessment, AuditEntry, Metric, VerificationMetrics, VerificationStatus, VerifiedQuote,
    PARTIAL_VARIANCE, VERIFIED_VARIANCE,
};
