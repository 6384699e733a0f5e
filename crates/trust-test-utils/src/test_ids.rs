//! Fixed identifiers and settings shared across tests.

use std::collections::HashMap;

/// Audience (`aud`) the identity provider issues tokens for.
pub const TEST_CLIENT_ID: &str = "com.example.dashboard";

/// Expected identity-provider issuer.
pub const TEST_IDP_ISSUER: &str = "https://appleid.apple.com";

/// Subject on the admin allow-list.
pub const TEST_ADMIN_SUBJECT: &str = "001.abc.999";

/// A subject that is authenticated but not an admin.
pub const TEST_USER_SUBJECT: &str = "002.def.123";

/// HS256 session secret (48 bytes).
pub const TEST_SESSION_SECRET: &str = "test-session-secret-that-is-long-enough-for-hs256";

/// Issuer stamped into session tokens.
pub const TEST_SESSION_ISSUER: &str = "dashboard-api";

/// Partner key identifier.
pub const TEST_PARTNER_KEY_ID: &str = "2X9R4HXF34";

/// Partner issuer identifier.
pub const TEST_PARTNER_ISSUER_ID: &str = "57246542-96fe-1a63-e053-0824d011072a";

/// Partner assertion audience.
pub const TEST_PARTNER_AUDIENCE: &str = "appstoreconnect-v1";

/// Path the mock provider serves its key document on.
pub const TEST_JWKS_PATH: &str = "/auth/keys";

/// Environment-style settings for a complete configuration.
///
/// `jwks_url` and `partner_private_key_pem` come from the mock provider and a
/// generated partner key; everything else uses the fixed values above.
pub fn test_config_vars(jwks_url: &str, partner_private_key_pem: &str) -> HashMap<String, String> {
    HashMap::from([
        ("IDP_CLIENT_ID".to_string(), TEST_CLIENT_ID.to_string()),
        ("IDP_ISSUER".to_string(), TEST_IDP_ISSUER.to_string()),
        ("IDP_JWKS_URL".to_string(), jwks_url.to_string()),
        ("IDP_ALLOW_INSECURE_JWKS_URL".to_string(), "true".to_string()),
        ("ADMIN_SUBJECTS".to_string(), TEST_ADMIN_SUBJECT.to_string()),
        ("SESSION_SECRET".to_string(), TEST_SESSION_SECRET.to_string()),
        ("SESSION_ISSUER".to_string(), TEST_SESSION_ISSUER.to_string()),
        ("PARTNER_KEY_ID".to_string(), TEST_PARTNER_KEY_ID.to_string()),
        (
            "PARTNER_ISSUER_ID".to_string(),
            TEST_PARTNER_ISSUER_ID.to_string(),
        ),
        (
            "PARTNER_PRIVATE_KEY".to_string(),
            partner_private_key_pem.to_string(),
        ),
    ])
}
