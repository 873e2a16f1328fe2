//! Custody Telemetry - Logging for the auditing service.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats
//! - Filter directives on top of a base level, with `RUST_LOG` taking over
//!   when it is set
//!
//! # Example
//!
//! ```rust,no_run
//! use custody_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), custody_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("custody_ingest=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!("auditing service starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
