//! Transport capabilities.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::message::{OutboundMessage, RawMessage};

/// Publishes messages to topics.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Connect to the broker.
    async fn connect(&self) -> TransportResult<()>;

    /// Publish messages, in order.
    async fn send(&self, messages: Vec<OutboundMessage>) -> TransportResult<()>;

    /// Disconnect from the broker.
    async fn disconnect(&self) -> TransportResult<()>;
}

/// Receives consumed messages one batch at a time.
///
/// The consume loop awaits each call before fetching the next batch.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    /// Process one batch.
    async fn handle_batch(&self, messages: Vec<RawMessage>);
}

/// Consumes topics as part of a consumer group.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Connect to the broker.
    async fn connect(&self) -> TransportResult<()>;

    /// Start the consume loop, delivering batches to `handler`.
    async fn start(&self, handler: Arc<dyn BatchHandler>) -> TransportResult<()>;

    /// Stop consuming. Returns once the in-flight batch has been handled.
    async fn stop(&self) -> TransportResult<()>;

    /// Disconnect from the broker.
    async fn disconnect(&self) -> TransportResult<()>;

    /// Release all client resources. Idempotent.
    async fn destroy(&self) -> TransportResult<()>;
}
