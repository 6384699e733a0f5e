//! Credential & Session Trust Core
//!
//! The security boundary of the dashboard API:
//!
//! - Identity token verification against the provider's rotating key set
//! - Admin authorization from a static allow-list
//! - Issuance, validation, and sliding refresh of session tokens
//! - Signed, cached assertions for outbound partner API calls
//!
//! # Flow
//!
//! ```text
//! identity token -> IdentityVerifier -> AuthorizedUser -> SessionManager -> session token
//! session token  -> require_session  -> SessionClaims  -> handler
//! partner call   -> PartnerClient    -> AssertionSigner (cached ES256)
//! ```
//!
//! # Modules
//!
//! - `assertion` - Outbound assertion signer and partner client
//! - `config` - Configuration from environment
//! - `errors` - Error kinds with HTTP status code mapping
//! - `identity` - Key set management and identity token verification
//! - `middleware` - Bearer session middleware
//! - `observability` - Tracing setup and metrics
//! - `session` - Session token manager and denylist

pub mod assertion;
pub mod config;
pub mod errors;
pub mod identity;
pub mod middleware;
pub mod observability;
pub mod session;

use crate::assertion::{AssertionSigner, PartnerClient};
use crate::config::Config;
use crate::errors::TrustError;
use crate::identity::IdentityVerifier;
use crate::middleware::SessionAuthState;
use crate::session::{SessionDenylist, SessionManager, SessionToken};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// The three trust components, built from one [`Config`].
#[derive(Clone)]
pub struct TrustCore {
    pub identity: Arc<IdentityVerifier>,
    pub sessions: Arc<SessionManager>,
    pub assertions: Arc<AssertionSigner>,
    pub partner: PartnerClient,
}

impl TrustCore {
    /// Build every component and prime the identity key set.
    ///
    /// Cancelling `cancel` aborts in-flight key fetches for the lifetime of
    /// the verifier.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::ConfigurationInvalid` if the session secret or
    /// partner key is unusable, or the provider serves a malformed key
    /// document. An unreachable provider is not fatal; keys are then fetched
    /// on first use.
    #[instrument(skip_all, name = "trust.initialize")]
    pub async fn initialize(config: &Config, cancel: CancellationToken) -> Result<Self, TrustError> {
        let sessions = Arc::new(SessionManager::new(&config.session)?);
        let assertions = Arc::new(AssertionSigner::new(&config.partner)?);
        let partner = PartnerClient::new(&config.partner, Arc::clone(&assertions))?;
        let identity = Arc::new(IdentityVerifier::new(&config.identity, cancel)?);

        match identity.prime().await {
            Ok(()) => {}
            Err(e @ TrustError::ConfigurationInvalid(_)) => {
                tracing::error!(target: "trust.identity.verifier", error = %e, "Identity provider key document is unusable");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    target: "trust.identity.verifier",
                    error = %e,
                    "Key set not primed at startup, will fetch on first verification"
                );
            }
        }

        tracing::info!(
            target: "trust.identity.verifier",
            admin_subjects = config.identity.admin_subjects.len(),
            "Trust core initialized"
        );

        Ok(Self {
            identity,
            sessions,
            assertions,
            partner,
        })
    }

    /// Exchange a provider identity token for a session token.
    ///
    /// # Errors
    ///
    /// Any verification error from [`IdentityVerifier::authenticate`], or
    /// `SigningFailed` if the session token cannot be minted.
    #[instrument(skip_all, name = "trust.sign_in")]
    pub async fn sign_in(&self, identity_token: &str) -> Result<SessionToken, TrustError> {
        let user = self.identity.authenticate(identity_token).await?;
        let session = self.sessions.generate_token(&user)?;
        tracing::info!(target: "trust.session", is_admin = user.is_admin(), "Session started");
        Ok(session)
    }

    /// Middleware state for routes protected by a session.
    pub fn session_auth_state(
        &self,
        denylist: Option<Arc<dyn SessionDenylist>>,
    ) -> Arc<SessionAuthState> {
        Arc::new(SessionAuthState {
            sessions: Arc::clone(&self.sessions),
            denylist,
        })
    }
}
