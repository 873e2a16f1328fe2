//! Cryptographic error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The key file exists but could not be read or parsed.
    #[error("failed to load private key from {path}: {reason}")]
    KeyLoad {
        /// Key file path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The key file is missing and generation is not allowed.
    #[error("private key file not found: {path}")]
    KeyFileMissing {
        /// Key file path.
        path: PathBuf,
    },

    /// Key pair generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// The provider was used before `init` or after `destroy`.
    #[error("no private key loaded")]
    KeyNotLoaded,

    /// The loaded key could not produce a signature.
    #[error("signing failed: {0}")]
    Signing(String),

    /// I/O error (e.g. reading/writing key files).
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
