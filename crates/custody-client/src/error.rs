//! Client error types.

use custody_crypto::CryptoError;
use custody_transport::TransportError;
use custody_types::TypesError;
use thiserror::Error;

/// Errors surfaced to callers of the audit client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The signing identity could not produce a fingerprint or signature.
    #[error("signing unavailable: {0}")]
    SigningUnavailable(#[source] CryptoError),

    /// The crypto provider failed to initialize or shut down.
    #[error("crypto provider error: {0}")]
    Crypto(#[from] CryptoError),

    /// The entry could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] TypesError),

    /// The transport rejected the entries.
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] TransportError),

    /// Writing to the console sink failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
