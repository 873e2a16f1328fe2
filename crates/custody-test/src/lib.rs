//! Custody Test - Shared test utilities.
//!
//! This crate provides fixtures, a cached signing key and failure-injecting
//! mocks that can be used across Custody crates as a dev-dependency.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! custody-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use custody_test::{sign_source_entry, sample_source_entry, test_crypto_provider};
//!
//! let crypto = test_crypto_provider();
//! let signed = sign_source_entry(&crypto, sample_source_entry("u1", "login"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod keys;
pub mod mocks;

pub use fixtures::*;
pub use keys::*;
pub use mocks::*;
