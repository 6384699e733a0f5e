//! Server-side session revocation.
//!
//! Session validation is stateless. A denylist lets a deployment end a
//! session before its expiry (logout, compromised device). Entries are keyed
//! by the token's `jti` and only need to live until that token would have
//! expired anyway.

use crate::errors::TrustError;
use crate::session::claims::SessionClaims;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Store of revoked session identifiers.
///
/// Consulted by the bearer middleware after a token validates.
#[async_trait]
pub trait SessionDenylist: Send + Sync {
    /// Revoke the session described by `claims` until its expiry.
    async fn revoke(&self, claims: &SessionClaims) -> Result<(), TrustError>;

    /// Whether the session identifier has been revoked.
    async fn is_revoked(&self, session_id: &str) -> Result<bool, TrustError>;
}

/// Process-local denylist.
///
/// Suitable for a single instance; a multi-instance deployment needs a shared
/// store behind the same trait.
#[derive(Debug, Default)]
pub struct InMemoryDenylist {
    // jti -> exp (Unix epoch seconds)
    entries: RwLock<HashMap<String, i64>>,
}

impl InMemoryDenylist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke as of `now`. Already-expired sessions are not stored.
    pub async fn revoke_at(&self, claims: &SessionClaims, now: i64) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, exp| *exp > now);

        if claims.expires_at() > now {
            entries.insert(claims.session_id().to_string(), claims.expires_at());
            tracing::info!(
                target: "trust.session",
                expires_in = claims.remaining_lifetime(now),
                "Session revoked"
            );
        }
    }

    /// Membership check as of `now`; entries past their expiry no longer count.
    pub async fn is_revoked_at(&self, session_id: &str, now: i64) -> bool {
        self.entries
            .read()
            .await
            .get(session_id)
            .is_some_and(|exp| *exp > now)
    }

    /// Drop entries whose sessions have expired. Returns the number removed.
    pub async fn prune_expired(&self, now: i64) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, exp| *exp > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionDenylist for InMemoryDenylist {
    async fn revoke(&self, claims: &SessionClaims) -> Result<(), TrustError> {
        self.revoke_at(claims, chrono::Utc::now().timestamp()).await;
        Ok(())
    }

    async fn is_revoked(&self, session_id: &str) -> Result<bool, TrustError> {
        Ok(self
            .is_revoked_at(session_id, chrono::Utc::now().timestamp())
            .await)
    }
}
