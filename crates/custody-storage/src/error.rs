//! Storage error types.

/// Errors from audit repositories.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend answered with an error status.
    #[error("backend returned {status}: {body}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid repository configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A storage operation failed.
    #[error("storage error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Serialization(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
