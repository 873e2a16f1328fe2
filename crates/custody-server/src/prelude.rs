//! Prelude module - commonly used types for convenient import.
//!
//! Use `use custody_server::prelude::*;` to import all essential types.

// Errors
pub use crate::{ApiError, ServerError, ServerResult};

// Lifecycle
pub use crate::{AppContext, BrokerIngress, RunningService, Service};

// Authorization
pub use crate::{AllowAll, AuthDenied, RequestAuthorizer};
