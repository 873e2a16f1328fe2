//! Telemetry error types.

use thiserror::Error;

/// Errors raised while installing the log subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A log level, format or filter directive did not parse.
    #[error("invalid logging configuration: {0}")]
    ConfigError(String),

    /// A global subscriber was already installed.
    #[error("log subscriber already installed: {0}")]
    InitError(String),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
