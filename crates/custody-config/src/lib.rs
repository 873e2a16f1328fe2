//! Custody Config - Layered configuration for the auditing service.
//!
//! Values come from, lowest priority first:
//!
//! 1. Embedded defaults (`defaults.toml` compiled into the binary)
//! 2. An optional TOML file (`--config <path>` or `CUSTODY_CONFIG`)
//! 3. Environment variables such as `PRODUCTION_MODE`, `KAFKA_AUDITS_TOPIC`
//!    or `ELASTICSEARCH_URL`
//!
//! The merged result is validated before it is returned.
//!
//! # Example
//!
//! ```rust,no_run
//! use custody_config::ServiceConfig;
//!
//! let resolved = ServiceConfig::load(None).unwrap();
//! println!("listening on port {}", resolved.config.http.port);
//! ```
//!
//! This crate has no dependencies on other custody crates. Conversion into
//! domain settings happens where the service is assembled.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

/// Environment variable overrides.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::ResolvedConfig;
pub use types::*;

impl ServiceConfig {
    /// Load from defaults, an optional file and the process environment.
    ///
    /// See [`loader::load`] for the full algorithm.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is malformed, an environment
    /// value does not parse, or validation fails.
    pub fn load(config_path: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(config_path, &env::collect_env_vars())
    }
}
