//! Custody Types - The audit envelope data model.
//!
//! This crate provides:
//! - Source-side entries ([`SourceAuditEntry`], [`SignedSourceAuditEntry`])
//! - Central-side entries ([`CentralAuditEntry`], [`SignedCentralAuditEntry`])
//! - Canonical serialization used as the exact input to signing
//! - Search filters, pagination clamps and result shapes
//!
//! # Envelope Layering
//!
//! Each envelope extends the previous one and serializes as a single flat
//! JSON object. The fields of the extended type always come first, in
//! declaration order, so a signer and a verifier that share these types
//! produce byte-identical canonical forms.
//!
//! # Example
//!
//! ```
//! use custody_types::{CanonicalForm, SecurityContext, SourceAuditEntry};
//!
//! let entry = SourceAuditEntry::builder("auditing-bc", "example-app", "1.0.0")
//!     .action("login", true)
//!     .security_context(SecurityContext::for_user("u1"))
//!     .build();
//!
//! let canonical = entry.canonical_form().unwrap();
//! assert!(canonical.starts_with("{\"id\":"));
//! assert!(!canonical.contains("sourceSignature"));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod canonical;
mod central;
mod entry;
mod error;
mod search;

pub use canonical::CanonicalForm;
pub use central::{CentralAuditEntry, INVALID_SIGNATURE, SignedCentralAuditEntry};
pub use entry::{
    AddressFamily, AuditEntryId, AuditEntryLabel, NetworkSource, SecurityContext,
    SignedSourceAuditEntry, SourceAuditEntry, SourceEntryBuilder, epoch_millis_now,
};
pub use error::{TypesError, TypesResult};
pub use search::{
    AuditSearchResults, KeywordField, MAX_PAGE_SIZE, PageRequest, SearchFilter, SearchKeywords,
};
