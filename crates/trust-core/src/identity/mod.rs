//! Identity Token Verifier.
//!
//! Proves that a presented identity token was issued by the trusted provider,
//! is unexpired, and targets this service; produces [`PrincipalClaims`] and
//! the derived [`AuthorizedUser`].

pub mod authorization;
pub mod claims;
pub mod jwks;
pub mod verifier;

pub use authorization::{derive_authorization, AuthorizedUser};
pub use claims::PrincipalClaims;
pub use jwks::{FetchError, HttpKeySource, Jwk, JwksDocument, KeySet, KeySource};
pub use verifier::IdentityVerifier;
