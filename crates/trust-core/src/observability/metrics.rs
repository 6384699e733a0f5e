//! Metrics definitions for the trust core.
//!
//! All metrics follow Prometheus naming conventions:
//! - `trust_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `token_type`: 2 values (identity, session)
//! - `status`: 2 values (success, error)
//! - `error_type`: bounded by `TrustError::kind`
//! - `cache`: 2 values (hit, miss)
//!
//! No recorder is installed here; the embedding service chooses its exporter.

use crate::errors::TrustError;
use metrics::{counter, histogram};
use std::time::Duration;

// ============================================================================
// Token Validation Metrics
// ============================================================================

/// Record a token validation outcome.
///
/// Metrics: `trust_token_validations_total`, `trust_token_validation_duration_seconds`
/// Labels: `token_type`, `status`, `error_type`
pub fn record_token_validation(token_type: &str, error: Option<&TrustError>, duration: Duration) {
    let (status, error_type) = match error {
        None => ("success", "none"),
        Some(e) => ("error", e.kind()),
    };

    counter!(
        "trust_token_validations_total",
        "token_type" => token_type.to_string(),
        "status" => status,
        "error_type" => error_type
    )
    .increment(1);

    histogram!("trust_token_validation_duration_seconds", "token_type" => token_type.to_string())
        .record(duration.as_secs_f64());
}

// ============================================================================
// Key Set Metrics
// ============================================================================

/// Record a JWKS fetch.
///
/// Metrics: `trust_jwks_refresh_total`, `trust_jwks_refresh_duration_seconds`
/// Labels: `status`
pub fn record_jwks_refresh(status: &str, duration: Duration) {
    counter!("trust_jwks_refresh_total", "status" => status.to_string()).increment(1);
    histogram!("trust_jwks_refresh_duration_seconds").record(duration.as_secs_f64());
}

// ============================================================================
// Assertion Metrics
// ============================================================================

/// Record an assertion request and whether the cache served it.
///
/// Metric: `trust_assertion_requests_total`
/// Labels: `cache`
pub fn record_assertion_request(cache: &'static str) {
    counter!("trust_assertion_requests_total", "cache" => cache).increment(1);
}

/// Record a newly signed partner assertion.
///
/// Metric: `trust_assertions_signed_total`
pub fn record_assertion_signed() {
    counter!("trust_assertions_signed_total").increment(1);
}

/// Record a partner API call outcome.
///
/// Metric: `trust_partner_requests_total`
/// Labels: `status` (`success`, `error`, or `retried` for an attempt the
/// partner rejected with 401)
pub fn record_partner_request(status: &'static str) {
    counter!("trust_partner_requests_total", "status" => status).increment(1);
}
