//! Transport error types.

use thiserror::Error;

/// Errors that can occur on the message transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation requires a connected client.
    #[error("transport client is not connected")]
    NotConnected,

    /// The consumer loop is already running.
    #[error("consumer is already started")]
    AlreadyStarted,

    /// The client was destroyed and cannot be reused.
    #[error("transport client was destroyed")]
    Destroyed,

    /// Publishing failed.
    #[error("publish failed: {0}")]
    Publish(String),

    /// The broker could not be reached.
    #[error("broker unreachable: {0}")]
    Connection(String),

    /// The broker answered with an error status.
    #[error("broker answered {status}: {body}")]
    Broker {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// A broker message or reply did not decode.
    #[error("undecodable broker data: {0}")]
    Decode(String),

    /// The consume loop task failed.
    #[error("consumer task failed: {0}")]
    Task(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
