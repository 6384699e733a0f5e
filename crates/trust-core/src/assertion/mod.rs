//! Outbound Assertion Signer and the partner API client that uses it.

pub mod client;
pub mod signer;

pub use client::PartnerClient;
pub use signer::{AssertionSigner, SignedAssertion};
