//! Data model error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding audit envelopes.
#[derive(Debug, Error)]
pub enum TypesError {
    /// An envelope could not be serialized to its canonical form.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A payload could not be decoded into an envelope.
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

/// Result type for data model operations.
pub type TypesResult<T> = Result<T, TypesError>;
