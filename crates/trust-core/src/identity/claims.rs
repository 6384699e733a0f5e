//! Claims extracted from verified identity tokens.
//!
//! `PrincipalClaims` can only be produced by [`IdentityVerifier::verify`];
//! it has no public constructor and no `Deserialize` impl. The subject,
//! email, and nonce are redacted in Debug output.
//!
//! [`IdentityVerifier::verify`]: crate::identity::IdentityVerifier::verify

use serde::Deserialize;
use std::fmt;

/// `aud` as issued: a single string or an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Audience {
    Single(String),
    Many(Vec<String>),
}

/// Identity token claims as they appear on the wire.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IdentityTokenClaims {
    pub(crate) sub: String,
    pub(crate) iat: i64,
    pub(crate) exp: i64,
    pub(crate) aud: Audience,
    pub(crate) iss: String,
    #[serde(default)]
    pub(crate) email: Option<String>,
    #[serde(default)]
    pub(crate) nonce: Option<String>,
}

/// The verified principal behind an identity token.
#[derive(Clone, PartialEq, Eq)]
pub struct PrincipalClaims {
    subject: String,
    email: Option<String>,
    issued_at: i64,
    expires_at: i64,
    audience: String,
    issuer: String,
    nonce: Option<String>,
}

impl PrincipalClaims {
    /// Build from claims that already passed signature and claim validation.
    ///
    /// `expected_audience` is the configured client identifier, which the
    /// validated `aud` is known to contain.
    pub(crate) fn from_verified(claims: IdentityTokenClaims, expected_audience: &str) -> Self {
        let audience = match claims.aud {
            Audience::Single(aud) => aud,
            Audience::Many(values) => values
                .into_iter()
                .find(|aud| aud == expected_audience)
                .unwrap_or_else(|| expected_audience.to_string()),
        };

        Self {
            subject: claims.sub,
            email: claims.email,
            issued_at: claims.iat,
            expires_at: claims.exp,
            audience,
            issuer: claims.iss,
            nonce: claims.nonce,
        }
    }

    /// Stable provider-side account identifier.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Issued-at (Unix epoch seconds).
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// Expiry (Unix epoch seconds).
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }
}

/// Custom Debug implementation that redacts personal identifiers.
impl fmt::Debug for PrincipalClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrincipalClaims")
            .field("subject", &"[REDACTED]")
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("nonce", &self.nonce.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_principal(subject: &str, email: Option<&str>) -> PrincipalClaims {
    PrincipalClaims {
        subject: subject.to_string(),
        email: email.map(ToString::to_string),
        issued_at: 1_700_000_000,
        expires_at: 1_700_000_300,
        audience: "com.example.dashboard".to_string(),
        issuer: "https://appleid.apple.com".to_string(),
        nonce: None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_claims_single_audience() {
        let json = r#"{
            "iss": "https://appleid.apple.com",
            "aud": "com.example.dashboard",
            "sub": "001.abc.999",
            "iat": 1700000000,
            "exp": 1700000300,
            "email": "admin@example.com",
            "email_verified": "true"
        }"#;

        let wire: IdentityTokenClaims = serde_json::from_str(json).unwrap();
        let claims = PrincipalClaims::from_verified(wire, "com.example.dashboard");

        assert_eq!(claims.subject(), "001.abc.999");
        assert_eq!(claims.email(), Some("admin@example.com"));
        assert_eq!(claims.issued_at(), 1_700_000_000);
        assert_eq!(claims.expires_at(), 1_700_000_300);
        assert_eq!(claims.audience(), "com.example.dashboard");
        assert_eq!(claims.issuer(), "https://appleid.apple.com");
        assert!(claims.nonce().is_none());
    }

    #[test]
    fn test_wire_claims_audience_array() {
        let json = r#"{
            "iss": "https://appleid.apple.com",
            "aud": ["other-client", "com.example.dashboard"],
            "sub": "001.abc.999",
            "iat": 1700000000,
            "exp": 1700000300,
            "nonce": "n-0S6_WzA2Mj"
        }"#;

        let wire: IdentityTokenClaims = serde_json::from_str(json).unwrap();
        let claims = PrincipalClaims::from_verified(wire, "com.example.dashboard");

        assert_eq!(claims.audience(), "com.example.dashboard");
        assert_eq!(claims.nonce(), Some("n-0S6_WzA2Mj"));
        assert!(claims.email().is_none());
    }

    #[test]
    fn test_wire_claims_missing_subject_rejected() {
        let json = r#"{"iss": "x", "aud": "y", "iat": 1, "exp": 2}"#;
        assert!(serde_json::from_str::<IdentityTokenClaims>(json).is_err());
    }

    #[test]
    fn test_debug_redacts_personal_fields() {
        let claims = test_principal("001.abc.999", Some("admin@example.com"));
        let debug_str = format!("{:?}", claims);

        assert!(!debug_str.contains("001.abc.999"));
        assert!(!debug_str.contains("admin@example.com"));
        assert!(debug_str.contains("[REDACTED]"));
        assert!(debug_str.contains("1700000300"));
    }
}
