//! Prelude module - commonly used types for convenient import.
//!
//! Use `use custody_transport::prelude::*;` to import all essential types.

// Errors
pub use crate::{TransportError, TransportResult};

// Messages
pub use crate::{OutboundMessage, RawMessage};

// Capabilities
pub use crate::{BatchHandler, MessageConsumer, MessageProducer};

// In-process broker
pub use crate::{ConsumerOptions, MemoryBroker, MemoryConsumer, MemoryProducer};

// Remote broker
pub use crate::{HttpConsumer, HttpProducer};
