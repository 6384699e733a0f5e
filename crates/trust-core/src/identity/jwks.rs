//! Identity provider key set: fetching, parsing, and the immutable `KeySet`.
//!
//! The provider publishes a JSON Web Key Set. Each fetch produces a fresh
//! [`KeySet`] that the verifier swaps in wholesale; a `KeySet` is never
//! mutated after construction.
//!
//! # Security
//!
//! - Only keys matching the verifier's fixed algorithm family enter the set
//! - Keys marked for a use other than `sig` are skipped
//! - Keys advertising a different `alg` are skipped
//! - Every fetch is bounded by the HTTP client timeout

use crate::errors::TrustError;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::instrument;

/// JSON Web Key from the provider's key document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC", or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is intended for.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// The provider's key document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Why a key fetch produced no usable `KeySet`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("key endpoint unreachable: {0}")]
    Network(String),

    #[error("key endpoint returned status {0}")]
    Status(u16),

    #[error("key fetch timed out")]
    Timeout,

    #[error("key fetch cancelled")]
    Cancelled,

    #[error("malformed key document: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Bounded label for metrics.
    pub fn status_label(&self) -> &'static str {
        match self {
            FetchError::Network(_) | FetchError::Status(_) => "error",
            FetchError::Timeout => "timeout",
            FetchError::Cancelled => "cancelled",
            FetchError::Malformed(_) => "malformed",
        }
    }
}

/// Mapping from key identifier to verification key, plus when it was fetched.
#[derive(Clone)]
pub struct KeySet {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
}

impl KeySet {
    /// The set the verifier starts with: no keys, never fetched.
    pub fn empty() -> Self {
        Self {
            keys: HashMap::new(),
            fetched_at: None,
        }
    }

    /// Build a set from a key document, keeping only keys usable with `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Malformed` when no key in the document is usable.
    pub fn from_document(
        document: &JwksDocument,
        algorithm: Algorithm,
        fetched_at: Instant,
    ) -> Result<Self, FetchError> {
        let mut keys = HashMap::new();

        for jwk in &document.keys {
            let Some(kid) = jwk.kid.as_deref().filter(|k| !k.is_empty()) else {
                tracing::debug!(target: "trust.identity.jwks", kty = %jwk.kty, "Skipping key without kid");
                continue;
            };

            let Some(key) = decoding_key(jwk, algorithm) else {
                continue;
            };

            if keys.contains_key(kid) {
                tracing::warn!(target: "trust.identity.jwks", kid = %kid, "Duplicate kid in key document, keeping first");
                continue;
            }
            keys.insert(kid.to_string(), key);
        }

        if keys.is_empty() {
            return Err(FetchError::Malformed(format!(
                "no usable {:?} keys among {} published",
                algorithm,
                document.keys.len()
            )));
        }

        Ok(Self {
            keys,
            fetched_at: Some(fetched_at),
        })
    }

    pub fn get(&self, kid: &str) -> Option<&DecodingKey> {
        self.keys.get(kid)
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key identifiers in the set (unordered).
    pub fn kids(&self) -> Vec<&str> {
        self.keys.keys().map(String::as_str).collect()
    }

    pub fn fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }

    /// True if the set was never fetched or is at least `ttl` old.
    pub fn is_stale(&self, ttl: Duration, now: Instant) -> bool {
        match self.fetched_at {
            Some(fetched_at) => now.saturating_duration_since(fetched_at) >= ttl,
            None => true,
        }
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kids = self.kids();
        kids.sort_unstable();
        f.debug_struct("KeySet")
            .field("kids", &kids)
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

/// Convert a JWK into a verification key if it is usable with `algorithm`.
fn decoding_key(jwk: &Jwk, algorithm: Algorithm) -> Option<DecodingKey> {
    if let Some(key_use) = jwk.key_use.as_deref() {
        if key_use != "sig" {
            tracing::debug!(target: "trust.identity.jwks", kid = ?jwk.kid, key_use = %key_use, "Skipping non-signing key");
            return None;
        }
    }

    let expected_alg = format!("{:?}", algorithm);
    if let Some(alg) = jwk.alg.as_deref() {
        if alg != expected_alg {
            tracing::debug!(target: "trust.identity.jwks", kid = ?jwk.kid, alg = %alg, "Skipping key for other algorithm");
            return None;
        }
    }

    let result = match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => match (jwk.kty.as_str(), &jwk.n, &jwk.e) {
            ("RSA", Some(n), Some(e)) => DecodingKey::from_rsa_components(n, e).ok(),
            _ => None,
        },
        Algorithm::ES256 | Algorithm::ES384 => {
            let curve = if algorithm == Algorithm::ES256 {
                "P-256"
            } else {
                "P-384"
            };
            match (jwk.kty.as_str(), jwk.crv.as_deref(), &jwk.x, &jwk.y) {
                ("EC", Some(crv), Some(x), Some(y)) if crv == curve => {
                    DecodingKey::from_ec_components(x, y).ok()
                }
                _ => None,
            }
        }
        Algorithm::EdDSA => match (jwk.kty.as_str(), jwk.crv.as_deref(), &jwk.x) {
            ("OKP", Some("Ed25519"), Some(x)) => DecodingKey::from_ed_components(x).ok(),
            _ => None,
        },
        // Symmetric algorithms never verify identity tokens
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => None,
    };

    if result.is_none() {
        tracing::debug!(
            target: "trust.identity.jwks",
            kid = ?jwk.kid,
            kty = %jwk.kty,
            "Skipping key unusable with configured algorithm"
        );
    }

    result
}

/// Source of the provider's key document (enables mocking).
#[async_trait::async_trait]
pub trait KeySource: Send + Sync {
    /// Fetch the current key document.
    async fn fetch(&self) -> Result<JwksDocument, FetchError>;
}

/// Fetches the key document over HTTPS.
pub struct HttpKeySource {
    /// URL to the key document endpoint.
    jwks_url: String,

    /// HTTP client with the configured timeout.
    http_client: reqwest::Client,
}

impl HttpKeySource {
    /// Create a key source for `jwks_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::ConfigurationInvalid` if the HTTP client cannot be built.
    pub fn new(jwks_url: String, timeout: Duration) -> Result<Self, TrustError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                tracing::error!(target: "trust.identity.jwks", error = %e, "Failed to build HTTP client");
                TrustError::ConfigurationInvalid(format!("HTTP client: {e}"))
            })?;

        Ok(Self {
            jwks_url,
            http_client,
        })
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}

#[async_trait::async_trait]
impl KeySource for HttpKeySource {
    #[instrument(skip_all, name = "trust.identity.jwks.fetch")]
    async fn fetch(&self) -> Result<JwksDocument, FetchError> {
        tracing::debug!(target: "trust.identity.jwks", url = %self.jwks_url, "Fetching key document");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "trust.identity.jwks", error = %e, "Failed to fetch key document");
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                target: "trust.identity.jwks",
                status = %status,
                "Key endpoint returned error"
            );
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::warn!(target: "trust.identity.jwks", error = %e, "Failed to read key document");
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(target: "trust.identity.jwks", error = %e, "Failed to parse key document");
            FetchError::Malformed(e.to_string())
        })
    }
}
