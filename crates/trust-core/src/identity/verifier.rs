//! Identity token verification against the provider's rotating key set.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Exactly one asymmetric algorithm is accepted, fixed at construction;
//!   the token header's `alg` is compared before any key lookup
//! - Expiry uses zero leeway; `iat` is checked against the clock skew
//! - An unknown `kid` triggers at most one key refresh per call
//!
//! # Concurrency
//!
//! The current `KeySet` lives in an `ArcSwap`, so readers always see a whole
//! set. Refreshes run under one async mutex; a caller that acquires it after
//! another caller has already replaced the set it observed reuses that set
//! instead of fetching again.

use crate::config::IdentityConfig;
use crate::errors::TrustError;
use crate::identity::authorization::{derive_authorization, AuthorizedUser};
use crate::identity::claims::{IdentityTokenClaims, PrincipalClaims};
use crate::identity::jwks::{FetchError, HttpKeySource, KeySet, KeySource};
use crate::observability::metrics;
use arc_swap::ArcSwap;
use common::jwt::{inspect_header, validate_iat_at, ExpiryClaim, JwtValidationError};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Verifies identity tokens issued by the configured provider.
pub struct IdentityVerifier {
    /// Expected `aud`.
    client_id: String,

    /// The single accepted algorithm.
    algorithm: Algorithm,

    /// Signature check only; the first decoding pass reads `exp` alone.
    signature_validation: Validation,

    /// Audience, issuer, and required claims for the second pass.
    claims_validation: Validation,

    /// Tolerated future `iat`.
    clock_skew: Duration,

    /// Maximum KeySet age before a refresh ahead of use.
    key_cache_ttl: Duration,

    /// Upper bound on a single key fetch.
    fetch_timeout: Duration,

    /// Subjects granted admin authorization.
    admin_subjects: HashSet<String>,

    /// Where key documents come from.
    source: Arc<dyn KeySource>,

    /// Current key set, replaced wholesale on refresh.
    keys: ArcSwap<KeySet>,

    /// Serializes refreshes.
    refresh_lock: Mutex<()>,

    /// Aborts in-flight key fetches.
    cancel: CancellationToken,
}

impl IdentityVerifier {
    /// Create a verifier fetching keys over HTTPS from `config.jwks_url`.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::ConfigurationInvalid` for a symmetric algorithm or
    /// if the HTTP client cannot be built.
    pub fn new(config: &IdentityConfig, cancel: CancellationToken) -> Result<Self, TrustError> {
        let source = HttpKeySource::new(config.jwks_url.clone(), config.http_timeout)?;
        Self::with_key_source(config, Arc::new(source), cancel)
    }

    /// Create a verifier with a custom key source.
    ///
    /// The KeySet starts empty; it is populated by [`prime`](Self::prime) or
    /// by the first verification.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::ConfigurationInvalid` for a symmetric algorithm.
    pub fn with_key_source(
        config: &IdentityConfig,
        source: Arc<dyn KeySource>,
        cancel: CancellationToken,
    ) -> Result<Self, TrustError> {
        if matches!(
            config.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(TrustError::ConfigurationInvalid(format!(
                "identity tokens cannot use symmetric algorithm {:?}",
                config.algorithm
            )));
        }

        // exp is compared by hand after the first pass
        let mut signature_validation = Validation::new(config.algorithm);
        signature_validation.leeway = 0;
        signature_validation.validate_exp = false;
        signature_validation.validate_aud = false;
        signature_validation.set_required_spec_claims(&["exp"]);

        // The second pass runs on a token whose signature was already verified
        let mut claims_validation = Validation::new(config.algorithm);
        claims_validation.insecure_disable_signature_validation();
        claims_validation.leeway = 0;
        claims_validation.validate_exp = false;
        claims_validation.set_audience(&[config.client_id.as_str()]);
        claims_validation.set_issuer(&[config.issuer.as_str()]);
        claims_validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

        Ok(Self {
            client_id: config.client_id.clone(),
            algorithm: config.algorithm,
            signature_validation,
            claims_validation,
            clock_skew: config.clock_skew,
            key_cache_ttl: config.key_cache_ttl,
            fetch_timeout: config.http_timeout,
            admin_subjects: config.admin_subjects.clone(),
            source,
            keys: ArcSwap::from_pointee(KeySet::empty()),
            refresh_lock: Mutex::new(()),
            cancel,
        })
    }

    /// Fetch keys eagerly at startup.
    ///
    /// # Errors
    ///
    /// - `TrustError::ConfigurationInvalid` if the provider serves a malformed
    ///   key document (fatal at startup)
    /// - `TrustError::KeyFetchFailed` if the provider is unreachable
    #[instrument(skip_all, name = "trust.identity.prime")]
    pub async fn prime(&self) -> Result<(), TrustError> {
        let observed = self.keys.load_full();
        match self.refresh_if_unchanged(&observed).await {
            Ok(set) => {
                tracing::info!(target: "trust.identity.jwks", key_count = set.len(), "Identity provider keys primed");
                Ok(())
            }
            Err(FetchError::Malformed(reason)) => Err(TrustError::ConfigurationInvalid(format!(
                "identity provider key document is malformed: {reason}"
            ))),
            Err(e) => Err(TrustError::KeyFetchFailed(e.to_string())),
        }
    }

    /// Fetch the provider's current keys and atomically replace the KeySet.
    ///
    /// Safe to call concurrently with [`verify`](Self::verify). Concurrent
    /// refreshes are coalesced into one fetch.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::KeyFetchFailed` on network failure, timeout,
    /// cancellation, or a malformed document.
    #[instrument(skip_all, name = "trust.identity.refresh_keys")]
    pub async fn refresh_keys(&self) -> Result<(), TrustError> {
        let observed = self.keys.load_full();
        self.refresh_if_unchanged(&observed)
            .await
            .map(|_| ())
            .map_err(|e| TrustError::KeyFetchFailed(e.to_string()))
    }

    /// Verify an identity token and return its principal.
    ///
    /// # Security Checks
    ///
    /// 1. Size and structure check before any decoding
    /// 2. Header `alg` must equal the fixed algorithm
    /// 3. Key lookup by `kid`, with at most one refresh
    /// 4. Signature, then `exp` (zero leeway) before any other claim
    /// 5. `aud`, `iss`, and the remaining claim shapes
    /// 6. `iat` no further in the future than the clock skew
    ///
    /// # Errors
    ///
    /// Each failure maps to one distinct `TrustError` kind. A key fetch failure
    /// is `KeyFetchFailed` so the caller can choose between 401 and 503.
    #[instrument(skip_all, name = "trust.identity.verify")]
    pub async fn verify(&self, token: &str) -> Result<PrincipalClaims, TrustError> {
        let start = std::time::Instant::now();
        let result = self.verify_inner(token).await;
        metrics::record_token_validation("identity", result.as_ref().err(), start.elapsed());

        if let Err(e) = &result {
            tracing::debug!(target: "trust.identity.verifier", kind = e.kind(), "Identity token rejected");
        }
        result
    }

    /// Verify a token and derive its authorization in one step.
    ///
    /// # Errors
    ///
    /// Same as [`verify`](Self::verify).
    pub async fn authenticate(&self, token: &str) -> Result<AuthorizedUser, TrustError> {
        let claims = self.verify(token).await?;
        Ok(self.derive_authorization(&claims))
    }

    /// Exact-match admin decision against the configured allow-list.
    pub fn derive_authorization(&self, claims: &PrincipalClaims) -> AuthorizedUser {
        derive_authorization(claims, &self.admin_subjects)
    }

    /// Snapshot of the current KeySet.
    pub fn key_set(&self) -> Arc<KeySet> {
        self.keys.load_full()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    async fn verify_inner(&self, token: &str) -> Result<PrincipalClaims, TrustError> {
        let header = inspect_header(token).map_err(|e| {
            let reason = match e {
                JwtValidationError::TokenTooLarge => "token exceeds size limit",
                JwtValidationError::MissingAlg => "token header has no algorithm",
                _ => "token is not a well-formed JWT",
            };
            TrustError::MalformedInput(reason.to_string())
        })?;

        let expected_alg = format!("{:?}", self.algorithm);
        if header.alg != expected_alg {
            tracing::debug!(
                target: "trust.identity.verifier",
                alg = %header.alg,
                expected = %expected_alg,
                "Token algorithm rejected"
            );
            return Err(TrustError::UnsupportedAlgorithm(header.alg));
        }

        let kid = header
            .kid
            .ok_or_else(|| TrustError::MalformedInput("token header has no kid".to_string()))?;

        let key = self.resolve_key(&kid).await?;

        // Expiry is settled before any other claim is looked at; exp == now is expired
        let expiry = decode::<ExpiryClaim>(token, &key, &self.signature_validation)?.claims;
        let now = chrono::Utc::now().timestamp();
        if expiry.exp <= now {
            return Err(TrustError::Expired);
        }

        let claims = decode::<IdentityTokenClaims>(token, &key, &self.claims_validation)?.claims;

        validate_iat_at(claims.iat, self.clock_skew, now).map_err(|_| {
            TrustError::MalformedInput("token issued too far in the future".to_string())
        })?;

        Ok(PrincipalClaims::from_verified(claims, &self.client_id))
    }

    /// Find the key for `kid`, refreshing the KeySet at most once.
    async fn resolve_key(&self, kid: &str) -> Result<DecodingKey, TrustError> {
        let mut observed = self.keys.load_full();

        if observed.is_stale(self.key_cache_ttl, Instant::now()) {
            match self.refresh_if_unchanged(&observed).await {
                Ok(current) => observed = current,
                Err(e) => {
                    if let Some(key) = observed.get(kid) {
                        tracing::warn!(
                            target: "trust.identity.jwks",
                            error = %e,
                            kid = %kid,
                            "Key refresh failed, using stale key"
                        );
                        return Ok(key.clone());
                    }
                    return Err(TrustError::KeyFetchFailed(e.to_string()));
                }
            }

            // The TTL refresh was this call's one refresh
            return observed.get(kid).cloned().ok_or_else(|| {
                tracing::debug!(target: "trust.identity.jwks", kid = %kid, "Key not found after refresh");
                TrustError::UnknownSigningKey
            });
        }

        if let Some(key) = observed.get(kid) {
            return Ok(key.clone());
        }

        tracing::debug!(target: "trust.identity.jwks", kid = %kid, "Unknown kid, refreshing keys");
        let current = self
            .refresh_if_unchanged(&observed)
            .await
            .map_err(|e| TrustError::KeyFetchFailed(e.to_string()))?;

        current.get(kid).cloned().ok_or_else(|| {
            tracing::warn!(target: "trust.identity.jwks", kid = %kid, "Key not found after refresh");
            TrustError::UnknownSigningKey
        })
    }

    /// Replace the KeySet unless another caller already replaced `observed`.
    async fn refresh_if_unchanged(&self, observed: &Arc<KeySet>) -> Result<Arc<KeySet>, FetchError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.keys.load_full();
        if !Arc::ptr_eq(&current, observed) {
            tracing::debug!(target: "trust.identity.jwks", "Key set already refreshed by another caller");
            return Ok(current);
        }

        let fresh = Arc::new(self.fetch_key_set().await?);
        self.keys.store(Arc::clone(&fresh));

        tracing::info!(
            target: "trust.identity.jwks",
            key_count = fresh.len(),
            "Identity provider keys refreshed"
        );
        Ok(fresh)
    }

    /// One bounded, cancellable fetch-and-parse.
    async fn fetch_key_set(&self) -> Result<KeySet, FetchError> {
        let start = std::time::Instant::now();

        let outcome = tokio::select! {
            () = self.cancel.cancelled() => Err(FetchError::Cancelled),
            fetched = tokio::time::timeout(self.fetch_timeout, self.source.fetch()) => {
                fetched.unwrap_or(Err(FetchError::Timeout))
            }
        };

        let result = outcome
            .and_then(|document| KeySet::from_document(&document, self.algorithm, Instant::now()));

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.status_label(),
        };
        metrics::record_jwks_refresh(status, start.elapsed());

        result
    }
}
