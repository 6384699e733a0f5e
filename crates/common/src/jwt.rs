//! JWT utilities shared across the trust crates.
//!
//! This module provides the checks that run before any signature work:
//! - Size limits for DoS prevention
//! - Header inspection (`alg` and `kid`) without verifying the token
//! - Clock skew constants and `iat` validation
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Header values are only hints for key and algorithm selection; callers
//!   must compare `alg` against the algorithm they fixed at construction and
//!   must still verify the signature
//! - Error messages are generic to prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{inspect_header, validate_iat_at, DEFAULT_CLOCK_SKEW};
//!
//! let header = inspect_header(token)?;
//! if header.alg != "RS256" {
//!     return Err(...);
//! }
//!
//! // After signature verification
//! validate_iat_at(claims.iat, DEFAULT_CLOCK_SKEW, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Maximum allowed JWT size in bytes (8KB).
///
/// Identity tokens from the provider are roughly 1KB (RS256 signature plus
/// a handful of claims); session tokens and partner assertions are well
/// under 600 bytes. Anything larger is rejected before base64 decoding or
/// signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes).
///
/// Tokens with `iat` (issued-at) timestamps more than this amount in the
/// future are rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// Errors that can occur during JWT pre-validation.
///
/// Display strings are intentionally generic. Details are logged at debug
/// level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The token is invalid or expired")]
    MalformedToken,

    /// Token header is missing the `alg` field.
    #[error("The token is invalid or expired")]
    MissingAlg,

    /// Token `iat` claim is too far in the future.
    #[error("The token is invalid or expired")]
    IatTooFarInFuture,
}

/// The unverified header fields needed to route a token to its verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Algorithm name as presented by the token (e.g. `RS256`).
    pub alg: String,

    /// Key identifier, if the header carries one.
    pub kid: Option<String>,
}

/// The `exp` claim alone.
///
/// Decoding into this first lets a verifier report an expired token as
/// expired even when the rest of its payload would not deserialize.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ExpiryClaim {
    /// Expiry (Unix epoch seconds).
    pub exp: i64,
}

/// Read the `alg` and `kid` header fields without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing
/// - The returned values are untrusted until the signature is verified
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong number of segments, bad base64, invalid JSON
/// - `MissingAlg` - Header has no string `alg` field
pub fn inspect_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(target: "common.jwt", len = token.len(), "Token rejected: over size ceiling");
        return Err(JwtValidationError::TokenTooLarge);
    }

    // header.payload.signature; only the first segment is read
    let mut segments = token.split('.');
    let header_segment = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(header), Some(_), Some(_), None) => header,
        _ => {
            tracing::debug!(target: "common.jwt", "Token rejected: not three dot-separated segments");
            return Err(JwtValidationError::MalformedToken);
        }
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Token rejected: header is not base64url");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Token rejected: header is not JSON");
        JwtValidationError::MalformedToken
    })?;

    let alg = header
        .get("alg")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingAlg)?;

    // Empty kid values are treated as absent
    let kid = header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);

    Ok(TokenHeader { alg, kid })
}

/// Check that `iat` is no more than `clock_skew` ahead of `now` (Unix epoch
/// seconds). `iat == now + clock_skew` is still accepted.
///
/// # Errors
///
/// `IatTooFarInFuture` when `iat > now + clock_skew`.
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX);
    let latest_accepted = now.saturating_add(skew);

    if iat <= latest_accepted {
        return Ok(());
    }

    tracing::debug!(
        target: "common.jwt",
        iat,
        latest_accepted,
        "Token rejected: issued in the future beyond clock skew"
    );
    Err(JwtValidationError::IatTooFarInFuture)
}
