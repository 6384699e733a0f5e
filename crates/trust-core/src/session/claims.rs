//! Session token claims.
//!
//! [`SessionClaims`] can only be obtained from the session manager: by
//! minting a token or by validating one. Refreshing therefore always starts
//! from claims that were proven valid.

use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session token claims as they appear on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SessionTokenClaims {
    pub(crate) sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) email: Option<String>,
    pub(crate) is_admin: bool,
    pub(crate) iat: i64,
    pub(crate) exp: i64,
    pub(crate) iss: String,
    pub(crate) jti: String,
}

/// Claims of a valid session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionClaims {
    subject: String,
    email: Option<String>,
    is_admin: bool,
    issued_at: i64,
    expires_at: i64,
    issuer: String,
    session_id: String,
}

impl SessionClaims {
    pub(crate) fn from_wire(claims: SessionTokenClaims) -> Self {
        Self {
            subject: claims.sub,
            email: claims.email,
            is_admin: claims.is_admin,
            issued_at: claims.iat,
            expires_at: claims.exp,
            issuer: claims.iss,
            session_id: claims.jti,
        }
    }

    pub(crate) fn to_wire(&self) -> SessionTokenClaims {
        SessionTokenClaims {
            sub: self.subject.clone(),
            email: self.email.clone(),
            is_admin: self.is_admin,
            iat: self.issued_at,
            exp: self.expires_at,
            iss: self.issuer.clone(),
            jti: self.session_id.clone(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Issued-at (Unix epoch seconds).
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// Expiry (Unix epoch seconds).
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Unique token identifier (`jti`), the denylist key.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Seconds of validity left at `now`, zero once expired.
    pub fn remaining_lifetime(&self, now: i64) -> i64 {
        (self.expires_at - now).max(0)
    }
}

/// Custom Debug implementation that redacts personal identifiers.
impl fmt::Debug for SessionClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClaims")
            .field("subject", &"[REDACTED]")
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("is_admin", &self.is_admin)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("issuer", &self.issuer)
            .field("session_id", &"[REDACTED]")
            .finish()
    }
}

/// A signed session token and the claims it carries.
#[derive(Debug, Clone)]
pub struct SessionToken {
    token: SecretString,
    claims: SessionClaims,
}

impl SessionToken {
    pub(crate) fn new(token: String, claims: SessionClaims) -> Self {
        Self {
            token: SecretString::from(token),
            claims,
        }
    }

    /// The compact token, for the `Authorization: Bearer` value.
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub fn claims(&self) -> &SessionClaims {
        &self.claims
    }

    /// Consume into the bare token string.
    pub fn into_token_string(self) -> String {
        self.token.expose_secret().to_string()
    }
}
