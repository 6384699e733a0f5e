//! Admin authorization derived from a verified principal.

use crate::identity::claims::PrincipalClaims;
use std::collections::HashSet;

/// A verified principal plus its admin decision.
///
/// `is_admin` is true only when the subject exactly matches an allow-list
/// entry. Absence from the allow-list withholds elevated authorization but
/// does not reject authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedUser {
    claims: PrincipalClaims,
    is_admin: bool,
}

impl AuthorizedUser {
    pub fn claims(&self) -> &PrincipalClaims {
        &self.claims
    }

    pub fn subject(&self) -> &str {
        self.claims.subject()
    }

    pub fn email(&self) -> Option<&str> {
        self.claims.email()
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }
}

/// Pair `claims` with an exact-match admin decision. Never mutates `claims`.
pub fn derive_authorization(
    claims: &PrincipalClaims,
    admin_subjects: &HashSet<String>,
) -> AuthorizedUser {
    AuthorizedUser {
        claims: claims.clone(),
        is_admin: admin_subjects.contains(claims.subject()),
    }
}
