//! Credential wrappers.
//!
//! The session signing secret, the partner private key PEM, and every bearer
//! token minted or held by the trust core travel as [`SecretString`]. Its
//! `Debug` output is a redaction marker and the buffer is zeroized on drop,
//! so config structs and token types can keep deriving `Debug`.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let signing_secret = SecretString::from("0123456789abcdef0123456789abcdef");
//! assert!(!format!("{signing_secret:?}").contains("0123456789"));
//! assert_eq!(signing_secret.expose_secret().len(), 32);
//! ```

pub use secrecy::{ExposeSecret, SecretString};
