//! Trust core configuration.
//!
//! Configuration is loaded from environment variables. Secret material (the
//! session secret and the partner private key) is held in `SecretString` and
//! redacted in Debug output.

use crate::errors::TrustError;
use common::config::{ObservabilityConfig, DEFAULT_LOG_LEVEL};
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use jsonwebtoken::Algorithm;
use std::collections::{HashMap, HashSet};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default identity-provider issuer.
pub const DEFAULT_IDP_ISSUER: &str = "https://appleid.apple.com";

/// Default identity-provider key document endpoint.
pub const DEFAULT_IDP_JWKS_URL: &str = "https://appleid.apple.com/auth/keys";

/// Default maximum KeySet age before a proactive refresh (1 hour).
pub const DEFAULT_KEY_CACHE_TTL_SECONDS: u64 = 3600;

/// Default session lifetime (24 hours).
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 86_400;

/// Default session token issuer.
pub const DEFAULT_SESSION_ISSUER: &str = "dashboard-api";

/// Minimum session secret length in bytes (HS256 key size).
pub const MIN_SESSION_SECRET_BYTES: usize = 32;

/// Default partner assertion audience.
pub const DEFAULT_PARTNER_AUDIENCE: &str = "appstoreconnect-v1";

/// Default partner API base URL.
pub const DEFAULT_PARTNER_API_URL: &str = "https://api.appstoreconnect.apple.com";

/// Default assertion lifetime (20 minutes).
pub const DEFAULT_ASSERTION_LIFETIME_SECONDS: u64 = 1200;

/// Maximum assertion lifetime the partner accepts.
pub const MAX_ASSERTION_LIFETIME_SECONDS: u64 = 1200;

/// Default safety margin before a cached assertion is regenerated.
pub const DEFAULT_ASSERTION_REFRESH_MARGIN_SECONDS: u64 = 60;

/// Default timeout for outbound HTTP requests.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Identity token verification settings.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Expected `aud` (the client identifier registered with the provider).
    pub client_id: String,

    /// Expected `iss`.
    pub issuer: String,

    /// Key document endpoint.
    pub jwks_url: String,

    /// The single accepted asymmetric algorithm.
    pub algorithm: Algorithm,

    /// Maximum KeySet age before it is refreshed ahead of use.
    pub key_cache_ttl: Duration,

    /// Subjects granted admin authorization (exact match).
    pub admin_subjects: HashSet<String>,

    /// Tolerated future `iat`.
    pub clock_skew: Duration,

    /// Timeout for each key fetch.
    pub http_timeout: Duration,
}

/// Session token settings.
#[derive(Clone)]
pub struct SessionConfig {
    /// HS256 signing secret.
    pub secret: SecretString,

    /// Session lifetime.
    pub ttl: Duration,

    /// `iss` stamped into and required of session tokens.
    pub issuer: String,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Outbound partner assertion settings.
#[derive(Clone)]
pub struct PartnerConfig {
    /// `kid` header of outbound assertions.
    pub key_id: String,

    /// `iss` claim of outbound assertions.
    pub issuer_id: String,

    /// PKCS#8 PEM encoded P-256 private key.
    pub private_key_pem: SecretString,

    /// `aud` claim of outbound assertions.
    pub audience: String,

    /// Partner API base URL.
    pub api_url: String,

    /// Lifetime of each signed assertion.
    pub assertion_lifetime: Duration,

    /// A cached assertion is reused only while more than this remains.
    pub refresh_margin: Duration,

    /// Timeout for partner API requests.
    pub http_timeout: Duration,
}

impl fmt::Debug for PartnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartnerConfig")
            .field("key_id", &self.key_id)
            .field("issuer_id", &self.issuer_id)
            .field("private_key_pem", &"[REDACTED]")
            .field("audience", &self.audience)
            .field("api_url", &self.api_url)
            .field("assertion_lifetime", &self.assertion_lifetime)
            .field("refresh_margin", &self.refresh_margin)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

/// Trust core configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub identity: IdentityConfig,
    pub session: SessionConfig,
    pub partner: PartnerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid session secret: {0}")]
    InvalidSessionSecret(String),

    #[error("Unsupported identity token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Insecure URL: {0}")]
    InsecureUrl(String),
}

/// Every configuration failure is fatal at startup.
impl From<ConfigError> for TrustError {
    fn from(err: ConfigError) -> Self {
        TrustError::ConfigurationInvalid(err.to_string())
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let http_timeout = Duration::from_secs(parse_positive(
            vars,
            "HTTP_TIMEOUT_SECONDS",
            DEFAULT_HTTP_TIMEOUT_SECONDS,
        )?);

        let identity = Self::identity_from_vars(vars, http_timeout)?;
        let session = Self::session_from_vars(vars)?;
        let partner = Self::partner_from_vars(vars, http_timeout)?;

        let observability = ObservabilityConfig {
            log_level: vars
                .get("LOG_LEVEL")
                .cloned()
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            json_logs: parse_bool(vars, "JSON_LOGS", false)?,
        };

        Ok(Config {
            identity,
            session,
            partner,
            observability,
        })
    }

    fn identity_from_vars(
        vars: &HashMap<String, String>,
        http_timeout: Duration,
    ) -> Result<IdentityConfig, ConfigError> {
        let client_id = required(vars, "IDP_CLIENT_ID")?;
        let issuer = optional(vars, "IDP_ISSUER", DEFAULT_IDP_ISSUER);
        let jwks_url = optional(vars, "IDP_JWKS_URL", DEFAULT_IDP_JWKS_URL);

        let allow_insecure = parse_bool(vars, "IDP_ALLOW_INSECURE_JWKS_URL", false)?;
        if !allow_insecure && !jwks_url.starts_with("https://") {
            return Err(ConfigError::InsecureUrl(format!(
                "IDP_JWKS_URL must use https, got '{}'",
                jwks_url
            )));
        }

        let algorithm = parse_identity_algorithm(&optional(vars, "IDP_ALGORITHM", "RS256"))?;

        let key_cache_ttl = Duration::from_secs(parse_positive(
            vars,
            "IDP_KEY_CACHE_TTL_SECONDS",
            DEFAULT_KEY_CACHE_TTL_SECONDS,
        )?);

        let admin_subjects = vars
            .get("ADMIN_SUBJECTS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let clock_skew = parse_clock_skew(vars)?;

        Ok(IdentityConfig {
            client_id,
            issuer,
            jwks_url,
            algorithm,
            key_cache_ttl,
            admin_subjects,
            clock_skew,
            http_timeout,
        })
    }

    fn session_from_vars(vars: &HashMap<String, String>) -> Result<SessionConfig, ConfigError> {
        let secret = required(vars, "SESSION_SECRET")?;
        if secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(ConfigError::InvalidSessionSecret(format!(
                "SESSION_SECRET must be at least {} bytes, got {}",
                MIN_SESSION_SECRET_BYTES,
                secret.len()
            )));
        }

        let ttl = Duration::from_secs(parse_positive(
            vars,
            "SESSION_TTL_SECONDS",
            DEFAULT_SESSION_TTL_SECONDS,
        )?);

        Ok(SessionConfig {
            secret: SecretString::from(secret),
            ttl,
            issuer: optional(vars, "SESSION_ISSUER", DEFAULT_SESSION_ISSUER),
        })
    }

    fn partner_from_vars(
        vars: &HashMap<String, String>,
        http_timeout: Duration,
    ) -> Result<PartnerConfig, ConfigError> {
        let key_id = required(vars, "PARTNER_KEY_ID")?;
        let issuer_id = required(vars, "PARTNER_ISSUER_ID")?;
        let private_key_pem = SecretString::from(required(vars, "PARTNER_PRIVATE_KEY")?);

        let lifetime_secs = parse_positive(
            vars,
            "ASSERTION_LIFETIME_SECONDS",
            DEFAULT_ASSERTION_LIFETIME_SECONDS,
        )?;
        if lifetime_secs > MAX_ASSERTION_LIFETIME_SECONDS {
            return Err(ConfigError::InvalidValue(format!(
                "ASSERTION_LIFETIME_SECONDS must not exceed {} seconds, got {}",
                MAX_ASSERTION_LIFETIME_SECONDS, lifetime_secs
            )));
        }

        let margin_secs = parse_u64(
            vars,
            "ASSERTION_REFRESH_MARGIN_SECONDS",
            DEFAULT_ASSERTION_REFRESH_MARGIN_SECONDS,
        )?;
        if margin_secs >= lifetime_secs {
            return Err(ConfigError::InvalidValue(format!(
                "ASSERTION_REFRESH_MARGIN_SECONDS ({}) must be less than ASSERTION_LIFETIME_SECONDS ({})",
                margin_secs, lifetime_secs
            )));
        }

        Ok(PartnerConfig {
            key_id,
            issuer_id,
            private_key_pem,
            audience: optional(vars, "PARTNER_AUDIENCE", DEFAULT_PARTNER_AUDIENCE),
            api_url: optional(vars, "PARTNER_API_URL", DEFAULT_PARTNER_API_URL),
            assertion_lifetime: Duration::from_secs(lifetime_secs),
            refresh_margin: Duration::from_secs(margin_secs),
            http_timeout,
        })
    }
}

/// Parse the identity token algorithm, rejecting every symmetric algorithm.
pub fn parse_identity_algorithm(value: &str) -> Result<Algorithm, ConfigError> {
    let algorithm = Algorithm::from_str(value)
        .map_err(|_| ConfigError::UnsupportedAlgorithm(value.to_string()))?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            Err(ConfigError::UnsupportedAlgorithm(format!(
                "{} is symmetric; identity tokens require an asymmetric algorithm",
                value
            )))
        }
        _ => Ok(algorithm),
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional(vars: &HashMap<String, String>, name: &str, default: &str) -> String {
    vars.get(name)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

fn parse_u64(vars: &HashMap<String, String>, name: &str, default: u64) -> Result<u64, ConfigError> {
    match vars.get(name) {
        Some(value_str) => value_str.trim().parse().map_err(|e| {
            ConfigError::InvalidValue(format!(
                "{} must be a valid non-negative integer, got '{}': {}",
                name, value_str, e
            ))
        }),
        None => Ok(default),
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let value = parse_u64(vars, name, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be positive, got 0",
            name
        )));
    }
    Ok(value)
}

fn parse_bool(vars: &HashMap<String, String>, name: &str, default: bool) -> Result<bool, ConfigError> {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue(format!(
            "{} must be true or false, got '{}'",
            name, v
        ))),
    }
}

fn parse_clock_skew(vars: &HashMap<String, String>) -> Result<Duration, ConfigError> {
    let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") else {
        return Ok(DEFAULT_CLOCK_SKEW);
    };

    let value: u64 = value_str.trim().parse().map_err(|e| {
        ConfigError::InvalidJwtClockSkew(format!(
            "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
            value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidJwtClockSkew(
            "JWT_CLOCK_SKEW_SECONDS must be positive, got 0".to_string(),
        ));
    }

    if value > MAX_CLOCK_SKEW.as_secs() {
        return Err(ConfigError::InvalidJwtClockSkew(format!(
            "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
            MAX_CLOCK_SKEW.as_secs(),
            value
        )));
    }

    Ok(Duration::from_secs(value))
}
