//! Bearer session middleware for protected routes.
//!
//! Extracts the session token from the `Authorization` header, validates it
//! with the [`SessionManager`], consults the denylist when one is
//! configured, and injects [`SessionClaims`] into request extensions.

use crate::errors::TrustError;
use crate::session::{SessionClaims, SessionDenylist, SessionManager};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the session middleware.
#[derive(Clone)]
pub struct SessionAuthState {
    pub sessions: Arc<SessionManager>,

    /// Revoked session identifiers; `None` disables server-side logout.
    pub denylist: Option<Arc<dyn SessionDenylist>>,
}

/// Require a valid, unrevoked session.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <session token>
/// ```
///
/// # Response
///
/// - 401 with `WWW-Authenticate` if the token is missing, invalid, expired, or revoked
/// - Otherwise continues with [`SessionClaims`] in extensions
#[instrument(skip_all, name = "trust.middleware.session")]
pub async fn require_session(
    State(state): State<Arc<SessionAuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, TrustError> {
    let claims = authenticate(&state, req.headers()).await?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Require a valid session whose subject is an admin.
///
/// Same as [`require_session`], plus 403 for authenticated non-admins.
#[instrument(skip_all, name = "trust.middleware.admin")]
pub async fn require_admin(
    State(state): State<Arc<SessionAuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, TrustError> {
    let claims = authenticate(&state, req.headers()).await?;
    if !claims.is_admin() {
        tracing::debug!(target: "trust.middleware", "Non-admin session rejected");
        return Err(TrustError::Forbidden);
    }
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

async fn authenticate(
    state: &SessionAuthState,
    headers: &HeaderMap,
) -> Result<SessionClaims, TrustError> {
    let token = bearer_token(headers)?;
    let claims = state.sessions.validate_token(token)?;

    if let Some(denylist) = &state.denylist {
        if denylist.is_revoked(claims.session_id()).await? {
            tracing::debug!(target: "trust.middleware", "Revoked session rejected");
            return Err(TrustError::Revoked);
        }
    }

    Ok(claims)
}

/// Extract the token from `Authorization: Bearer <token>`.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, TrustError> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "trust.middleware", "Missing Authorization header");
            TrustError::MalformedInput("missing Authorization header".to_string())
        })?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            tracing::debug!(target: "trust.middleware", "Invalid Authorization header format");
            TrustError::MalformedInput("invalid Authorization header format".to_string())
        })
}

/// Extension trait for reading session claims from a request.
pub trait SessionClaimsExt {
    /// `None` if the session middleware was not applied to this request.
    fn session_claims(&self) -> Option<&SessionClaims>;
}

impl<B> SessionClaimsExt for axum::extract::Request<B> {
    fn session_claims(&self) -> Option<&SessionClaims> {
        self.extensions().get::<SessionClaims>()
    }
}
