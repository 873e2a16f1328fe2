//! Prelude module - commonly used types for convenient import.
//!
//! Use `use custody_ingest::prelude::*;` to import all essential types.

// Errors
pub use crate::{IngestError, IngestResult};

// Aggregate
pub use crate::{AuditingAggregate, BatchOutcome, ServiceIdentity};
