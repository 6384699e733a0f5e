//! Session token issuance, validation, and sliding-window refresh.
//!
//! Session tokens are HS256 JWTs signed with the service secret. The manager
//! holds no mutable state; every operation is a pure function of its input,
//! the secret, and the current time.
//!
//! # Security
//!
//! - Only HS256 is accepted; the header `alg` is checked before decoding
//! - Expiry is read on its own right after the signature check, so an
//!   expired token reports `Expired` whatever else is wrong with it
//! - Refresh re-mints from validated claims and never revokes the old token

use crate::config::{SessionConfig, MIN_SESSION_SECRET_BYTES};
use crate::errors::TrustError;
use crate::identity::AuthorizedUser;
use crate::observability::metrics;
use crate::session::claims::{SessionClaims, SessionToken, SessionTokenClaims};
use common::jwt::{inspect_header, validate_iat_at, ExpiryClaim, DEFAULT_CLOCK_SKEW};
use common::secret::ExposeSecret;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

/// The one algorithm session tokens use.
const SESSION_ALGORITHM: Algorithm = Algorithm::HS256;

/// Mints and validates the service's own bearer credentials.
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    signature_validation: Validation,
    claims_validation: Validation,
    ttl_seconds: i64,
    issuer: String,
}

impl SessionManager {
    /// Create a session manager from configuration.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::ConfigurationInvalid` if the secret is shorter than
    /// 32 bytes or the TTL is zero or out of range.
    pub fn new(config: &SessionConfig) -> Result<Self, TrustError> {
        let secret = config.secret.expose_secret().as_bytes();
        if secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(TrustError::ConfigurationInvalid(format!(
                "session secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        let ttl_seconds = i64::try_from(config.ttl.as_secs())
            .ok()
            .filter(|ttl| *ttl > 0)
            .ok_or_else(|| {
                TrustError::ConfigurationInvalid("session TTL must be positive".to_string())
            })?;

        // exp and iss are checked by hand to fix the error precedence
        let mut signature_validation = Validation::new(SESSION_ALGORITHM);
        signature_validation.validate_exp = false;
        signature_validation.validate_aud = false;
        signature_validation.leeway = 0;
        signature_validation.set_required_spec_claims(&["exp"]);

        let mut claims_validation = signature_validation.clone();
        claims_validation.insecure_disable_signature_validation();
        claims_validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            signature_validation,
            claims_validation,
            ttl_seconds,
            issuer: config.issuer.clone(),
        })
    }

    /// Configured session lifetime.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds.unsigned_abs())
    }

    /// Mint a session token for a verified, authorized user.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::SigningFailed` if encoding fails.
    pub fn generate_token(&self, user: &AuthorizedUser) -> Result<SessionToken, TrustError> {
        self.generate_token_at(user, chrono::Utc::now().timestamp())
    }

    /// Mint a session token as of `now` (Unix epoch seconds).
    ///
    /// # Errors
    ///
    /// Same as [`generate_token`](Self::generate_token).
    #[instrument(skip_all, name = "trust.session.generate")]
    pub fn generate_token_at(
        &self,
        user: &AuthorizedUser,
        now: i64,
    ) -> Result<SessionToken, TrustError> {
        let claims = SessionTokenClaims {
            sub: user.subject().to_string(),
            email: user.email().map(ToString::to_string),
            is_admin: user.is_admin(),
            iat: now,
            exp: now.saturating_add(self.ttl_seconds),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = self.sign(&claims)?;
        tracing::debug!(target: "trust.session", is_admin = claims.is_admin, exp = claims.exp, "Session token minted");
        Ok(SessionToken::new(token, SessionClaims::from_wire(claims)))
    }

    /// Validate a session token and return its claims.
    ///
    /// # Errors
    ///
    /// - `MalformedInput` - not a well-formed JWT
    /// - `UnsupportedAlgorithm` - any algorithm other than HS256
    /// - `SignatureInvalid` - signed with a different secret
    /// - `Expired` - `now >= exp`
    /// - `IssuerMismatch` - `iss` is not this service
    pub fn validate_token(&self, token: &str) -> Result<SessionClaims, TrustError> {
        self.validate_token_at(token, chrono::Utc::now().timestamp())
    }

    /// Validate a session token as of `now` (Unix epoch seconds).
    ///
    /// # Errors
    ///
    /// Same as [`validate_token`](Self::validate_token).
    #[instrument(skip_all, name = "trust.session.validate")]
    pub fn validate_token_at(&self, token: &str, now: i64) -> Result<SessionClaims, TrustError> {
        let start = std::time::Instant::now();
        let result = self.validate_inner(token, now);
        metrics::record_token_validation("session", result.as_ref().err(), start.elapsed());

        if let Err(e) = &result {
            tracing::debug!(target: "trust.session", kind = e.kind(), "Session token rejected");
        }
        result
    }

    /// Re-mint a validated session with a fresh window.
    ///
    /// Subject, email, and admin flag carry over; `iat` becomes now, `exp`
    /// becomes now + TTL, and a new `jti` is assigned. The old token remains
    /// valid until its own expiry.
    ///
    /// # Errors
    ///
    /// - `Expired` if `claims` expired since they were validated
    /// - `SigningFailed` if encoding fails
    pub fn refresh_token(&self, claims: &SessionClaims) -> Result<SessionToken, TrustError> {
        self.refresh_token_at(claims, chrono::Utc::now().timestamp())
    }

    /// Refresh as of `now` (Unix epoch seconds).
    ///
    /// # Errors
    ///
    /// Same as [`refresh_token`](Self::refresh_token).
    #[instrument(skip_all, name = "trust.session.refresh")]
    pub fn refresh_token_at(
        &self,
        claims: &SessionClaims,
        now: i64,
    ) -> Result<SessionToken, TrustError> {
        if now >= claims.expires_at() {
            return Err(TrustError::Expired);
        }

        let mut refreshed = claims.to_wire();
        refreshed.iat = now;
        refreshed.exp = now.saturating_add(self.ttl_seconds);
        refreshed.iss = self.issuer.clone();
        refreshed.jti = Uuid::new_v4().to_string();

        let token = self.sign(&refreshed)?;
        tracing::debug!(target: "trust.session", exp = refreshed.exp, "Session token refreshed");
        Ok(SessionToken::new(token, SessionClaims::from_wire(refreshed)))
    }

    fn validate_inner(&self, token: &str, now: i64) -> Result<SessionClaims, TrustError> {
        let header = inspect_header(token)
            .map_err(|_| TrustError::MalformedInput("token is not a well-formed JWT".to_string()))?;

        if header.alg != "HS256" {
            return Err(TrustError::UnsupportedAlgorithm(header.alg));
        }

        let expiry =
            decode::<ExpiryClaim>(token, &self.decoding_key, &self.signature_validation)?.claims;
        if now >= expiry.exp {
            return Err(TrustError::Expired);
        }

        let claims =
            decode::<SessionTokenClaims>(token, &self.decoding_key, &self.claims_validation)?
                .claims;

        if claims.iss != self.issuer {
            return Err(TrustError::IssuerMismatch);
        }

        validate_iat_at(claims.iat, DEFAULT_CLOCK_SKEW, now).map_err(|_| {
            TrustError::MalformedInput("token issued too far in the future".to_string())
        })?;

        Ok(SessionClaims::from_wire(claims))
    }

    fn sign(&self, claims: &SessionTokenClaims) -> Result<String, TrustError> {
        let mut header = Header::new(SESSION_ALGORITHM);
        header.typ = Some("JWT".to_string());

        encode(&header, claims, &self.encoding_key).map_err(|e| {
            tracing::error!(target: "trust.session", error = %e, "Session token signing failed");
            TrustError::SigningFailed(format!("session token signing failed: {e}"))
        })
    }
}
