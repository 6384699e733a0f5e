//! Builders for identity-provider tokens.
//!
//! Defaults produce a token the verifier accepts: correct issuer and
//! audience, issued now, expiring in five minutes.

use crate::crypto_fixtures::IdpSigningKey;
use crate::test_ids::{TEST_CLIENT_ID, TEST_IDP_ISSUER, TEST_USER_SUBJECT};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// Claims as an identity provider would issue them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestIdentityClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Builder for identity tokens.
#[derive(Debug, Clone)]
pub struct TestIdentityTokenBuilder {
    claims: TestIdentityClaims,
}

impl Default for TestIdentityTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestIdentityTokenBuilder {
    pub fn new() -> Self {
        let now = Utc::now().timestamp();
        Self {
            claims: TestIdentityClaims {
                iss: TEST_IDP_ISSUER.to_string(),
                aud: TEST_CLIENT_ID.to_string(),
                sub: TEST_USER_SUBJECT.to_string(),
                iat: now,
                exp: now + 300,
                email: None,
                nonce: None,
            },
        }
    }

    pub fn for_subject(mut self, sub: &str) -> Self {
        self.claims.sub = sub.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.claims.email = Some(email.to_string());
        self
    }

    pub fn with_nonce(mut self, nonce: &str) -> Self {
        self.claims.nonce = Some(nonce.to_string());
        self
    }

    pub fn with_issuer(mut self, iss: &str) -> Self {
        self.claims.iss = iss.to_string();
        self
    }

    pub fn with_audience(mut self, aud: &str) -> Self {
        self.claims.aud = aud.to_string();
        self
    }

    pub fn issued_at(mut self, iat: i64) -> Self {
        self.claims.iat = iat;
        self
    }

    pub fn expires_at(mut self, exp: i64) -> Self {
        self.claims.exp = exp;
        self
    }

    /// Shift expiry `secs` into the past (relative to now).
    pub fn expired_by(mut self, secs: i64) -> Self {
        let now = Utc::now().timestamp();
        self.claims.iat = now - secs - 600;
        self.claims.exp = now - secs;
        self
    }

    pub fn claims(&self) -> &TestIdentityClaims {
        &self.claims
    }

    /// Sign with an RS256 fixture key.
    pub fn sign_with(&self, key: &IdpSigningKey) -> String {
        key.sign(&self.claims)
    }

    /// Forge an HS256 token using `secret` (e.g. the provider's public modulus).
    pub fn sign_hs256(&self, kid: &str, secret: &[u8]) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(kid.to_string());
        encode(&header, &self.claims, &EncodingKey::from_secret(secret))
            .expect("Failed to sign HS256 token")
    }

    /// Build an unsigned `alg: none` token.
    pub fn unsigned(&self, kid: &str) -> String {
        let header = serde_json::json!({"alg": "none", "typ": "JWT", "kid": kid});
        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_b64 =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&self.claims).expect("claims serialize"));
        format!("{header_b64}.{payload_b64}.")
    }
}
