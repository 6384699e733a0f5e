//! # Trust Test Utilities
//!
//! Shared test utilities for the trust core.
//!
//! This crate provides:
//! - Deterministic RSA identity-provider keys and generated P-256 partner keys
//! - Identity token builders (`TestIdentityTokenBuilder`)
//! - A wiremock-backed key endpoint (`MockJwksProvider`)
//! - Fixed test identifiers and a complete configuration map
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trust_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = IdpSigningKey::fixture(1, "key-1")?;
//!     let provider = MockJwksProvider::start().await;
//!     provider.serve_keys(&[&key]).await;
//!
//!     let token = TestIdentityTokenBuilder::new()
//!         .for_subject(TEST_ADMIN_SUBJECT)
//!         .sign_with(&key);
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_mock;
pub mod test_ids;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_mock::*;
pub use test_ids::*;
pub use token_builders::*;
