//! Session Token Manager.
//!
//! Mints, validates, and refreshes the service's own HS256 session tokens.

pub mod claims;
pub mod denylist;
pub mod manager;

pub use claims::{SessionClaims, SessionToken};
pub use denylist::{InMemoryDenylist, SessionDenylist};
pub use manager::SessionManager;
