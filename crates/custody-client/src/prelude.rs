//! Prelude module - commonly used types for convenient import.
//!
//! Use `use custody_client::prelude::*;` to import all essential types.

// Errors
pub use crate::{ClientError, ClientResult};

// Client
pub use crate::{AuditClient, SourceIdentity};

// Dispatchers
pub use crate::{AuditDispatcher, BrokerDispatcher, ConsoleDispatcher, MemoryDispatcher};
