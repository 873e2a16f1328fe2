//! Prelude module - commonly used types for convenient import.
//!
//! Use `use custody_types::prelude::*;` to import all essential types.

// Errors
pub use crate::{TypesError, TypesResult};

// Source envelopes
pub use crate::{
    AddressFamily, AuditEntryId, AuditEntryLabel, NetworkSource, SecurityContext,
    SignedSourceAuditEntry, SourceAuditEntry,
};

// Central envelopes
pub use crate::{CentralAuditEntry, INVALID_SIGNATURE, SignedCentralAuditEntry};

// Canonical serialization
pub use crate::CanonicalForm;

// Search
pub use crate::{AuditSearchResults, KeywordField, PageRequest, SearchFilter, SearchKeywords};
