//! Server error types.

use std::net::SocketAddr;
use std::time::Duration;

use custody_config::ConfigError;
use custody_crypto::CryptoError;
use custody_ingest::IngestError;
use custody_storage::StorageError;
use custody_transport::TransportError;
use thiserror::Error;

/// Errors raised while assembling, starting or stopping the service.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The signing key could not be loaded or generated.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The repository failed to initialize.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The message consumer failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The aggregate could not establish its identity.
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// The HTTP listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Startup did not complete in time.
    #[error("service startup exceeded {0:?}")]
    StartupTimeout(Duration),

    /// The HTTP server task failed.
    #[error("http server error: {0}")]
    Http(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
