//! Prelude module - commonly used types for convenient import.
//!
//! Use `use custody_config::prelude::*;` to import all essential types.

// Errors
pub use crate::{ConfigError, ConfigResult};

// Configuration
pub use crate::{ResolvedConfig, ServiceConfig, StorageBackend};
