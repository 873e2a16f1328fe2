//! Ingestion error types.

use custody_crypto::CryptoError;
use custody_storage::StorageError;
use thiserror::Error;

/// Errors raised while ingesting audit entries.
///
/// Only [`IngestError::Identity`] is ever returned to callers; the others
/// are per-record or per-batch conditions that are logged and absorbed.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The service signing identity could not be established.
    #[error("service identity unavailable: {0}")]
    Identity(#[source] CryptoError),

    /// A transport message did not hold a signed source entry.
    #[error("malformed message at {topic}/{offset}: {reason}")]
    MalformedMessage {
        /// Source topic.
        topic: String,
        /// Message offset.
        offset: i64,
        /// Decoding failure.
        reason: String,
    },

    /// The source signature could not be checked.
    #[error("source signature verification failed: {0}")]
    Verification(String),

    /// The central signature could not be produced.
    #[error("central signing failed: {0}")]
    Signing(String),

    /// The batch could not be stored.
    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;
