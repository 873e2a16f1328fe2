//! Audit dispatchers.
//!
//! A dispatcher moves signed entries off the source host. Failures are
//! surfaced to the caller and never retried here.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use custody_transport::{MessageProducer, OutboundMessage};
use custody_types::SignedSourceAuditEntry;
use tracing::debug;

use crate::error::ClientResult;

/// Default topic for source audit entries.
pub const DEFAULT_AUDITS_TOPIC: &str = "audits";

/// Ships signed source entries.
#[async_trait]
pub trait AuditDispatcher: Send + Sync {
    /// Prepare the dispatcher.
    async fn init(&self) -> ClientResult<()>;

    /// Release resources. Idempotent.
    async fn destroy(&self) -> ClientResult<()>;

    /// Ship `entries` in order.
    async fn dispatch(&self, entries: Vec<SignedSourceAuditEntry>) -> ClientResult<()>;
}

/// Publishes one transport message per entry.
pub struct BrokerDispatcher {
    producer: Arc<dyn MessageProducer>,
    topic: String,
}

impl BrokerDispatcher {
    /// Dispatch through `producer` to the default topic.
    #[must_use]
    pub fn new(producer: Arc<dyn MessageProducer>) -> Self {
        Self::with_topic(producer, DEFAULT_AUDITS_TOPIC)
    }

    /// Dispatch through `producer` to `topic`.
    #[must_use]
    pub fn with_topic(producer: Arc<dyn MessageProducer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    /// The destination topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl std::fmt::Debug for BrokerDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerDispatcher")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuditDispatcher for BrokerDispatcher {
    async fn init(&self) -> ClientResult<()> {
        self.producer.connect().await?;
        Ok(())
    }

    async fn destroy(&self) -> ClientResult<()> {
        self.producer.disconnect().await?;
        Ok(())
    }

    async fn dispatch(&self, entries: Vec<SignedSourceAuditEntry>) -> ClientResult<()> {
        let messages = entries
            .iter()
            .map(|entry| Ok(OutboundMessage::new(&self.topic, entry.to_json_vec()?)))
            .collect::<ClientResult<Vec<_>>>()?;
        let count = messages.len();
        self.producer.send(messages).await?;
        debug!(topic = %self.topic, count, "Dispatched audit entries");
        Ok(())
    }
}

/// Records dispatched entries in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDispatcher {
    entries: Arc<Mutex<Vec<SignedSourceAuditEntry>>>,
}

impl MemoryDispatcher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything dispatched so far.
    #[must_use]
    pub fn entries(&self) -> Vec<SignedSourceAuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AuditDispatcher for MemoryDispatcher {
    async fn init(&self) -> ClientResult<()> {
        Ok(())
    }

    async fn destroy(&self) -> ClientResult<()> {
        Ok(())
    }

    async fn dispatch(&self, entries: Vec<SignedSourceAuditEntry>) -> ClientResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(entries);
        Ok(())
    }
}

/// Prints each entry as one line of JSON.
#[derive(Debug)]
pub struct ConsoleDispatcher<W = std::io::Stdout> {
    out: Mutex<W>,
}

impl ConsoleDispatcher {
    /// Print to stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }
}

impl Default for ConsoleDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> ConsoleDispatcher<W> {
    /// Print to `out`.
    #[must_use]
    pub fn with_writer(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<W: Write + Send> AuditDispatcher for ConsoleDispatcher<W> {
    async fn init(&self) -> ClientResult<()> {
        Ok(())
    }

    async fn destroy(&self) -> ClientResult<()> {
        self.out.lock().unwrap_or_else(PoisonError::into_inner).flush()?;
        Ok(())
    }

    async fn dispatch(&self, entries: Vec<SignedSourceAuditEntry>) -> ClientResult<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        for entry in &entries {
            let line = entry.to_json_vec()?;
            out.write_all(&line)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }
}
