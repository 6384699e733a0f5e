//! Observability for the trust core.
//!
//! # Privacy by Default
//!
//! Instrumented functions use `#[instrument(skip_all)]`. Tokens, secrets,
//! and private keys never appear in logs; subjects and emails are redacted
//! in `Debug` output of every claims type.

pub mod metrics;

use crate::errors::TrustError;
use common::config::ObservabilityConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this more
/// than once returns an error rather than replacing the subscriber.
///
/// # Errors
///
/// Returns `TrustError::ConfigurationInvalid` if the filter directive does
/// not parse or a global subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), TrustError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.log_level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| {
        TrustError::ConfigurationInvalid(format!("failed to install tracing subscriber: {e}"))
    })
}

fn build_filter(directive: &str) -> Result<EnvFilter, TrustError> {
    EnvFilter::try_new(directive).map_err(|e| {
        TrustError::ConfigurationInvalid(format!("invalid log filter {directive:?}: {e}"))
    })
}
