//! Prelude module - commonly used types for convenient import.
//!
//! Use `use custody_storage::prelude::*;` to import all essential types.

// Errors
pub use crate::{StorageError, StorageResult};

// Repositories
pub use crate::{AuditRepo, ElasticsearchAuditRepo, ElasticsearchConfig, MemoryAuditRepo};
