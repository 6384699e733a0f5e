//! Trust core error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Error messages returned to clients are intentionally generic to avoid
//! leaking which check failed. The specific kind is logged server-side and
//! recorded in metrics via [`TrustError::kind`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::errors::ErrorKind;
use serde::Serialize;
use thiserror::Error;

/// Generic client-facing message for every 401.
const INVALID_TOKEN_MESSAGE: &str = "The token is invalid or expired";

/// Trust core error type.
///
/// Maps to appropriate HTTP status codes:
/// - MalformedInput, SignatureInvalid, Expired, AudienceMismatch,
///   IssuerMismatch, UnsupportedAlgorithm, UnknownSigningKey, Revoked:
///   401 Unauthorized
/// - Forbidden: 403 Forbidden
/// - PartnerRequestFailed: 502 Bad Gateway
/// - KeyFetchFailed: 503 Service Unavailable
/// - ConfigurationInvalid, SigningFailed: 500 Internal Server Error
///
/// `ConfigurationInvalid` is fatal at startup. Every other kind is a
/// per-request rejection and never degrades to "treat as valid".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrustError {
    #[error("Malformed token: {0}")]
    MalformedInput(String),

    #[error("Token signature is invalid")]
    SignatureInvalid,

    #[error("Token has expired")]
    Expired,

    #[error("Token audience does not match")]
    AudienceMismatch,

    #[error("Token issuer does not match")]
    IssuerMismatch,

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token signing key is not known")]
    UnknownSigningKey,

    #[error("Session has been revoked")]
    Revoked,

    #[error("Forbidden")]
    Forbidden,

    #[error("Key fetch failed: {0}")]
    KeyFetchFailed(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Partner request failed: {0}")]
    PartnerRequestFailed(String),
}

impl TrustError {
    /// Bounded label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TrustError::MalformedInput(_) => "malformed_input",
            TrustError::SignatureInvalid => "signature_invalid",
            TrustError::Expired => "expired",
            TrustError::AudienceMismatch => "audience_mismatch",
            TrustError::IssuerMismatch => "issuer_mismatch",
            TrustError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            TrustError::UnknownSigningKey => "unknown_signing_key",
            TrustError::Revoked => "revoked",
            TrustError::Forbidden => "forbidden",
            TrustError::KeyFetchFailed(_) => "key_fetch_failed",
            TrustError::ConfigurationInvalid(_) => "configuration_invalid",
            TrustError::SigningFailed(_) => "signing_failed",
            TrustError::PartnerRequestFailed(_) => "partner_request_failed",
        }
    }

    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            TrustError::MalformedInput(_)
            | TrustError::SignatureInvalid
            | TrustError::Expired
            | TrustError::AudienceMismatch
            | TrustError::IssuerMismatch
            | TrustError::UnsupportedAlgorithm(_)
            | TrustError::UnknownSigningKey
            | TrustError::Revoked => 401,
            TrustError::Forbidden => 403,
            TrustError::PartnerRequestFailed(_) => 502,
            TrustError::KeyFetchFailed(_) => 503,
            TrustError::ConfigurationInvalid(_) | TrustError::SigningFailed(_) => 500,
        }
    }
}

/// Map `jsonwebtoken` failures onto trust error kinds.
impl From<jsonwebtoken::errors::Error> for TrustError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TrustError::Expired,
            ErrorKind::InvalidSignature => TrustError::SignatureInvalid,
            ErrorKind::InvalidAudience => TrustError::AudienceMismatch,
            ErrorKind::InvalidIssuer => TrustError::IssuerMismatch,
            ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
                TrustError::UnsupportedAlgorithm("algorithm not accepted".to_string())
            }
            // A key that cannot verify is no better than a wrong signature
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::Crypto(_) => TrustError::SignatureInvalid,
            ErrorKind::MissingRequiredClaim(claim) => {
                TrustError::MalformedInput(format!("missing required claim: {claim}"))
            }
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => TrustError::MalformedInput("token is not decodable".to_string()),
            _ => TrustError::MalformedInput(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for TrustError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            TrustError::MalformedInput(_)
            | TrustError::SignatureInvalid
            | TrustError::Expired
            | TrustError::AudienceMismatch
            | TrustError::IssuerMismatch
            | TrustError::UnsupportedAlgorithm(_)
            | TrustError::UnknownSigningKey
            | TrustError::Revoked => {
                tracing::debug!(target: "trust.errors", kind = self.kind(), "Credential rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_TOKEN",
                    INVALID_TOKEN_MESSAGE,
                )
            }
            TrustError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Insufficient privileges",
            ),
            TrustError::KeyFetchFailed(reason) => {
                // Log actual reason server-side
                tracing::warn!(target: "trust.errors", reason = %reason, "Identity provider keys unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable",
                )
            }
            TrustError::PartnerRequestFailed(reason) => {
                tracing::warn!(target: "trust.errors", reason = %reason, "Partner API request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "Upstream service request failed",
                )
            }
            TrustError::ConfigurationInvalid(reason) | TrustError::SigningFailed(reason) => {
                tracing::error!(target: "trust.errors", kind = self.kind(), reason = %reason, "Internal trust failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred",
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.to_string(),
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"dashboard-api\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}
