//! Custody Crypto - Signing identities for audit envelopes.
//!
//! This crate provides:
//! - RSA key pairs with a cached SHA-256 public-key fingerprint
//! - RSASSA-PKCS1-v1_5 signing and verification with base64 signatures
//! - Hardened PKCS#8 PEM key files
//! - [`CryptoProvider`] and [`AuditCryptoProvider`] capability traits
//!
//! # Key Custody
//!
//! Each process owns exactly one key. Private key bytes never leave the
//! provider; callers only ever see the fingerprint and signatures.
//!
//! # Example
//!
//! ```no_run
//! use custody_crypto::{AuditCryptoProvider, CryptoProvider, LocalCryptoProvider, MissingKeyPolicy};
//!
//! # async fn run() -> custody_crypto::CryptoResult<()> {
//! let provider = LocalCryptoProvider::new("/app/data/audit_private_key.pem", MissingKeyPolicy::Fail);
//! provider.init().await?;
//!
//! let key_id = provider.pub_key_fingerprint()?;
//! let signature = provider.sign(b"canonical form")?;
//! assert!(provider.verify_source_signature(b"canonical form", &key_id, &signature)?);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod keyfile;
mod keypair;
mod provider;

pub use error::{CryptoError, CryptoResult};
pub use keyfile::{create_private_key_file, load_private_key_file};
pub use keypair::{DEFAULT_MODULUS_BITS, MIN_MODULUS_BITS, RsaKeyPair};
pub use provider::{AuditCryptoProvider, CryptoProvider, LocalCryptoProvider, MissingKeyPolicy};
