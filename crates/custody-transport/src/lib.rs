//! Custody Transport - Topic pub/sub plumbing.
//!
//! This crate provides:
//! - [`RawMessage`] and [`OutboundMessage`] envelopes
//! - [`MessageProducer`], [`MessageConsumer`] and [`BatchHandler`] capabilities
//! - [`MemoryBroker`], an in-process broker with consumer groups
//! - [`HttpProducer`] and [`HttpConsumer`], clients of a broker hosted
//!   behind the HTTP protocol described in [`wire`]
//!
//! # Delivery Model
//!
//! A consumer delivers one batch at a time and waits for the handler to
//! finish it before fetching more; back-pressure lives in the consume loop.
//! Stopping a consumer lets the in-flight batch complete.
//!
//! # Example
//!
//! ```rust
//! use custody_transport::{MemoryBroker, OutboundMessage};
//!
//! let broker = MemoryBroker::new();
//! broker.publish(OutboundMessage::new("audits", b"{}".to_vec()));
//!
//! let batch = broker.fetch("audits", "auditing-bc_auditing-svc", 10);
//! assert_eq!(batch.len(), 1);
//! assert_eq!(batch[0].offset, 0);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod wire;

mod consumer;
mod error;
mod http;
mod memory;
mod message;
mod traits;

pub use error::{TransportError, TransportResult};
pub use http::{DEFAULT_POLL_WAIT, HttpConsumer, HttpProducer};
pub use memory::{
    ConsumerOptions, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT, MemoryBroker, MemoryConsumer,
    MemoryProducer,
};
pub use message::{OutboundMessage, RawMessage};
pub use traits::{BatchHandler, MessageConsumer, MessageProducer};
