//! Canonical serialization.
//!
//! The canonical form of an envelope is its compact JSON encoding with
//! fields in declaration order. It is only defined for the unsigned types:
//! a value whose signature is not a field cannot accidentally sign over it.

use serde::Serialize;

use crate::central::CentralAuditEntry;
use crate::entry::SourceAuditEntry;
use crate::error::{TypesError, TypesResult};

/// Types that have a canonical, signable byte form.
pub trait CanonicalForm: Serialize {
    /// Produce the exact string that is signed and verified.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::Serialization`] if encoding fails.
    fn canonical_form(&self) -> TypesResult<String> {
        serde_json::to_string(self).map_err(|e| TypesError::Serialization(e.to_string()))
    }
}

impl CanonicalForm for SourceAuditEntry {}
impl CanonicalForm for CentralAuditEntry {}
