//! Custody Client - Emit signed audit entries from a source application.
//!
//! This crate provides:
//! - [`AuditClient`], which builds, signs and dispatches entries
//! - [`AuditDispatcher`] with broker, in-memory and console variants
//! - A host network snapshot of non-loopback addresses
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use custody_client::{AuditClient, ConsoleDispatcher, SourceIdentity};
//! use custody_crypto::{LocalCryptoProvider, MissingKeyPolicy};
//! use custody_types::SecurityContext;
//!
//! # async fn run() -> custody_client::ClientResult<()> {
//! let crypto = Arc::new(LocalCryptoProvider::new("/app/data/key.pem", MissingKeyPolicy::default()));
//! let client = AuditClient::new(
//!     SourceIdentity::new("accounts-bc", "accounts-svc", "1.0.0"),
//!     crypto,
//!     Arc::new(ConsoleDispatcher::new()),
//! );
//! client.init().await?;
//! client
//!     .audit("login", true, Some(SecurityContext::for_user("u1")), None)
//!     .await?;
//! client.destroy().await?;
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

mod client;
mod dispatcher;
mod error;
mod network;

pub use client::{AuditClient, SourceIdentity};
pub use dispatcher::{
    AuditDispatcher, BrokerDispatcher, ConsoleDispatcher, DEFAULT_AUDITS_TOPIC, MemoryDispatcher,
};
pub use error::{ClientError, ClientResult};
pub use network::{local_network_sources, non_loopback_sources};
