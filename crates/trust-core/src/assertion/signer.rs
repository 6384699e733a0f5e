//! Outbound Assertion Signer.
//!
//! Produces short-lived ES256 assertions that authenticate this service to
//! the partner API. The private key is parsed once at construction. Signed
//! assertions are cached and reused until they come within the refresh
//! margin of expiry.
//!
//! # Concurrency
//!
//! The check-then-sign sequence runs inside one mutex, so callers racing on
//! a stale cache produce exactly one signature. Signing is CPU-bound and
//! never awaits, so a blocking mutex is held only briefly.

use crate::config::PartnerConfig;
use crate::errors::TrustError;
use crate::observability::metrics;
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::instrument;

const PKCS8_PEM_TAG: &str = "PRIVATE KEY";

/// Claims carried by an outbound assertion.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    iat: i64,
    exp: i64,
    aud: &'a str,
}

/// A signed partner assertion and its expiry.
#[derive(Clone)]
pub struct SignedAssertion {
    token: SecretString,
    issued_at: i64,
    expires_at: i64,
}

impl SignedAssertion {
    /// The compact token, for the `Authorization: Bearer` value.
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// Issued-at (Unix epoch seconds).
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// Expiry (Unix epoch seconds).
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }
}

impl fmt::Debug for SignedAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedAssertion")
            .field("token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Signs and caches partner API assertions.
pub struct AssertionSigner {
    encoding_key: EncodingKey,
    key_id: String,
    issuer_id: String,
    audience: String,
    lifetime_seconds: i64,
    refresh_margin_seconds: i64,
    cached: Mutex<Option<SignedAssertion>>,
    signatures_issued: AtomicU64,
}

impl fmt::Debug for AssertionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssertionSigner")
            .field("key_id", &self.key_id)
            .field("issuer_id", &self.issuer_id)
            .field("audience", &self.audience)
            .field("lifetime_seconds", &self.lifetime_seconds)
            .field("refresh_margin_seconds", &self.refresh_margin_seconds)
            .finish_non_exhaustive()
    }
}

impl AssertionSigner {
    /// Parse the partner private key and build a signer.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::ConfigurationInvalid` if the PEM does not contain a
    /// PKCS#8 P-256 private key, or the margin is not shorter than the lifetime.
    pub fn new(config: &PartnerConfig) -> Result<Self, TrustError> {
        let pkcs8 = parse_private_key_pem(config.private_key_pem.expose_secret())?;

        // Validate before handing the DER to jsonwebtoken, which only fails at sign time
        EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &pkcs8, &SystemRandom::new())
            .map_err(|e| {
                TrustError::ConfigurationInvalid(format!(
                    "partner private key is not a PKCS#8 P-256 key: {e}"
                ))
            })?;

        let lifetime_seconds = seconds(config.assertion_lifetime)?;
        let refresh_margin_seconds = seconds(config.refresh_margin)?;
        if lifetime_seconds == 0 || refresh_margin_seconds >= lifetime_seconds {
            return Err(TrustError::ConfigurationInvalid(
                "assertion refresh margin must be shorter than a non-zero lifetime".to_string(),
            ));
        }

        tracing::debug!(
            target: "trust.assertion",
            key_id = %config.key_id,
            lifetime_seconds,
            "Partner assertion signer initialized"
        );

        Ok(Self {
            encoding_key: EncodingKey::from_ec_der(&pkcs8),
            key_id: config.key_id.clone(),
            issuer_id: config.issuer_id.clone(),
            audience: config.audience.clone(),
            lifetime_seconds,
            refresh_margin_seconds,
            cached: Mutex::new(None),
            signatures_issued: AtomicU64::new(0),
        })
    }

    /// Return a valid assertion, signing a new one only when needed.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::SigningFailed` if signing fails.
    pub fn get_assertion(&self) -> Result<SignedAssertion, TrustError> {
        self.get_assertion_at(chrono::Utc::now().timestamp())
    }

    /// [`get_assertion`](Self::get_assertion) as of `now` (Unix epoch seconds).
    ///
    /// The cached assertion is reused while more than the refresh margin
    /// remains before its expiry.
    ///
    /// # Errors
    ///
    /// Same as [`get_assertion`](Self::get_assertion).
    #[instrument(skip_all, name = "trust.assertion.get")]
    pub fn get_assertion_at(&self, now: i64) -> Result<SignedAssertion, TrustError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(assertion) = cached.as_ref() {
            if assertion.expires_at - now > self.refresh_margin_seconds {
                metrics::record_assertion_request("hit");
                return Ok(assertion.clone());
            }
        }

        metrics::record_assertion_request("miss");
        let assertion = self.sign(now)?;
        *cached = Some(assertion.clone());
        Ok(assertion)
    }

    /// Discard the cached assertion so the next call signs afresh.
    pub fn invalidate(&self) {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if cached.take().is_some() {
            tracing::debug!(target: "trust.assertion", "Cached partner assertion invalidated");
        }
    }

    /// Number of signatures computed since construction.
    pub fn signatures_issued(&self) -> u64 {
        self.signatures_issued.load(Ordering::Relaxed)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    fn sign(&self, now: i64) -> Result<SignedAssertion, TrustError> {
        let mut header = Header::new(Algorithm::ES256);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.key_id.clone());

        let expires_at = now.saturating_add(self.lifetime_seconds);
        let claims = AssertionClaims {
            iss: &self.issuer_id,
            iat: now,
            exp: expires_at,
            aud: &self.audience,
        };

        let token = encode(&header, &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(target: "trust.assertion", error = %e, "Partner assertion signing failed");
            TrustError::SigningFailed(format!("partner assertion signing failed: {e}"))
        })?;

        self.signatures_issued.fetch_add(1, Ordering::Relaxed);
        metrics::record_assertion_signed();
        tracing::debug!(target: "trust.assertion", expires_at, "Partner assertion signed");

        Ok(SignedAssertion {
            token: SecretString::from(token),
            issued_at: now,
            expires_at,
        })
    }
}

/// Extract the DER of the single `PRIVATE KEY` block in `pem_text`.
fn parse_private_key_pem(pem_text: &str) -> Result<Vec<u8>, TrustError> {
    let blocks = pem::parse_many(pem_text).map_err(|e| {
        TrustError::ConfigurationInvalid(format!("partner private key is not valid PEM: {e}"))
    })?;

    let mut blocks = blocks.into_iter();
    match (blocks.next(), blocks.next()) {
        (Some(block), None) if block.tag() == PKCS8_PEM_TAG => Ok(block.into_contents()),
        (Some(block), None) => Err(TrustError::ConfigurationInvalid(format!(
            "partner private key PEM is labelled {:?}, expected {PKCS8_PEM_TAG:?}",
            block.tag()
        ))),
        (None, _) => Err(TrustError::ConfigurationInvalid(
            "partner private key PEM contains no block".to_string(),
        )),
        (Some(_), Some(_)) => Err(TrustError::ConfigurationInvalid(
            "partner private key PEM must contain exactly one block".to_string(),
        )),
    }
}

fn seconds(duration: std::time::Duration) -> Result<i64, TrustError> {
    i64::try_from(duration.as_secs()).map_err(|_| {
        TrustError::ConfigurationInvalid("assertion duration out of range".to_string())
    })
}
