//! HTTP middleware.

pub mod session_auth;

pub use session_auth::{require_admin, require_session, SessionAuthState, SessionClaimsExt};
