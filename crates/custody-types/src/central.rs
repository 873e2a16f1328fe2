//! Central-side audit entries.
//!
//! The central service wraps every inbound [`SignedSourceAuditEntry`] with
//! its own provenance and signs the result. The source signature is kept
//! verbatim, valid or not; `invalid_source_signature` records the outcome
//! of verification.

use serde::{Deserialize, Serialize};

use crate::entry::{AuditEntryId, SignedSourceAuditEntry, SourceAuditEntry};

/// Sentinel stored in place of a signature that could not be produced.
pub const INVALID_SIGNATURE: &str = "INVALID";

/// A signed source entry stamped with central metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CentralAuditEntry {
    /// The inbound entry, including its source signature.
    #[serde(flatten)]
    pub source: SignedSourceAuditEntry,
    /// True when the source signature failed or could not be verified.
    pub invalid_source_signature: bool,
    /// When the central service stamped the entry (epoch ms, service clock).
    pub persistence_timestamp: i64,
    /// Name of the central service instance.
    pub auditing_svc_app_name: String,
    /// Version of the central service instance.
    pub auditing_svc_app_version: String,
    /// Fingerprint of the central service's signing key.
    pub auditing_svc_key_id: String,
}

impl CentralAuditEntry {
    /// Attach the central service signature.
    #[must_use]
    pub fn into_signed(self, auditing_svc_signature: impl Into<String>) -> SignedCentralAuditEntry {
        SignedCentralAuditEntry {
            central: self,
            auditing_svc_signature: auditing_svc_signature.into(),
        }
    }
}

/// The terminal, persisted form of an audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedCentralAuditEntry {
    /// The stamped entry.
    #[serde(flatten)]
    pub central: CentralAuditEntry,
    /// Base64 central signature, or [`INVALID_SIGNATURE`].
    pub auditing_svc_signature: String,
}

impl SignedCentralAuditEntry {
    /// The entry id assigned by the source.
    #[must_use]
    pub fn id(&self) -> AuditEntryId {
        self.central.source.entry.id
    }

    /// The original source entry.
    #[must_use]
    pub fn source_entry(&self) -> &SourceAuditEntry {
        &self.central.source.entry
    }

    /// Whether the central signature is the sentinel.
    #[must_use]
    pub fn has_sentinel_signature(&self) -> bool {
        self.auditing_svc_signature == INVALID_SIGNATURE
    }
}
