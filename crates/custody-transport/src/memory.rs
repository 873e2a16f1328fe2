//! In-process broker.
//!
//! [`MemoryBroker`] keeps an append-only log per topic and a read cursor per
//! consumer group. New groups start from the beginning of the log. Fetching
//! advances the group cursor, so consumers of one group split the work and
//! each message is delivered to a group once.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::consumer::Lifecycle;
use crate::error::{TransportError, TransportResult};
use crate::message::{OutboundMessage, RawMessage};
use crate::traits::{BatchHandler, MessageConsumer, MessageProducer};

/// Default maximum number of messages per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default time to wait for a batch to fill.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Default)]
struct TopicLog {
    messages: Vec<RawMessage>,
    cursors: HashMap<String, usize>,
}

#[derive(Debug, Default)]
struct BrokerInner {
    topics: Mutex<HashMap<String, TopicLog>>,
    appended: Notify,
}

/// Shared in-process broker. Clones share the same logs.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and wake waiting consumers.
    ///
    /// Returns the message offset.
    pub fn publish(&self, message: OutboundMessage) -> i64 {
        let offset = {
            let mut topics = self.lock();
            let log = topics.entry(message.topic.clone()).or_default();
            let offset = i64::try_from(log.messages.len()).unwrap_or(i64::MAX);
            log.messages.push(RawMessage {
                topic: message.topic,
                key: message.key,
                value: message.value,
                timestamp: chrono::Utc::now().timestamp_millis(),
                partition: 0,
                offset,
                headers: message.headers,
            });
            offset
        };
        trace!(offset, "Message appended");
        self.inner.appended.notify_waiters();
        offset
    }

    /// Take up to `max` unread messages for `group` from `topic`.
    #[must_use]
    pub fn fetch(&self, topic: &str, group: &str, max: usize) -> Vec<RawMessage> {
        let mut topics = self.lock();
        let Some(log) = topics.get_mut(topic) else {
            return Vec::new();
        };
        let cursor = log.cursors.entry(group.to_string()).or_insert(0);
        let start = *cursor;
        let end = start.saturating_add(max).min(log.messages.len());
        *cursor = end;
        log.messages
            .get(start..end)
            .map(<[RawMessage]>::to_vec)
            .unwrap_or_default()
    }

    /// Like [`fetch`](Self::fetch), but wait up to `wait` for a message
    /// when none is unread.
    ///
    /// Returns as soon as at least one message is claimed.
    pub async fn fetch_wait(
        &self,
        topic: &str,
        group: &str,
        max: usize,
        wait: Duration,
    ) -> Vec<RawMessage> {
        let now = Instant::now();
        let deadline = now.checked_add(wait).unwrap_or(now);
        loop {
            let mut notified = pin!(self.inner.appended.notified());
            notified.as_mut().enable();

            let batch = self.fetch(topic, group, max);
            if !batch.is_empty() || max == 0 {
                return batch;
            }
            if tokio::time::timeout_at(deadline, notified.as_mut())
                .await
                .is_err()
            {
                return batch;
            }
        }
    }

    /// Number of messages ever published to `topic`.
    #[must_use]
    pub fn topic_len(&self, topic: &str) -> usize {
        self.lock().get(topic).map_or(0, |log| log.messages.len())
    }

    /// Number of messages in `topic` not yet fetched by `group`.
    #[must_use]
    pub fn lag(&self, topic: &str, group: &str) -> usize {
        self.lock().get(topic).map_or(0, |log| {
            let cursor = log.cursors.get(group).copied().unwrap_or(0);
            log.messages.len().saturating_sub(cursor)
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, TopicLog>> {
        self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer publishing into a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryProducer {
    broker: MemoryBroker,
    connected: Mutex<bool>,
}

impl MemoryProducer {
    /// Create a producer for `broker`.
    #[must_use]
    pub fn new(broker: MemoryBroker) -> Self {
        Self {
            broker,
            connected: Mutex::new(false),
        }
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_connected(&self, value: bool) {
        *self.connected.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

#[async_trait]
impl MessageProducer for MemoryProducer {
    async fn connect(&self) -> TransportResult<()> {
        self.set_connected(true);
        Ok(())
    }

    async fn send(&self, messages: Vec<OutboundMessage>) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        for message in messages {
            self.broker.publish(message);
        }
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.set_connected(false);
        Ok(())
    }
}

/// Batching options for a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Maximum messages per batch. Values below 1 are treated as 1.
    pub batch_size: usize,
    /// How long to wait for a started batch to fill.
    pub batch_timeout: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
        }
    }
}

/// Consumer-group member reading from a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryConsumer {
    broker: MemoryBroker,
    topics: Vec<String>,
    options: ConsumerOptions,
    lifecycle: Lifecycle,
}

impl MemoryConsumer {
    /// Create a consumer for `topics` in group `group_id`.
    #[must_use]
    pub fn new(
        broker: MemoryBroker,
        group_id: impl Into<String>,
        topics: Vec<String>,
        options: ConsumerOptions,
    ) -> Self {
        Self {
            broker,
            topics,
            options,
            lifecycle: Lifecycle::new(group_id.into()),
        }
    }

    /// The consumer group id.
    #[must_use]
    pub fn group_id(&self) -> &str {
        self.lifecycle.group_id()
    }

    /// Whether the consume loop is running.
    pub async fn is_running(&self) -> bool {
        self.lifecycle.is_running().await
    }
}

#[async_trait]
impl MessageConsumer for MemoryConsumer {
    async fn connect(&self) -> TransportResult<()> {
        self.lifecycle.connect().await
    }

    async fn start(&self, handler: Arc<dyn BatchHandler>) -> TransportResult<()> {
        let broker = self.broker.clone();
        let group_id = self.group_id().to_string();
        let topics = self.topics.clone();
        let options = self.options;
        self.lifecycle
            .start(&self.topics, move |cancel| {
                ConsumeLoop {
                    broker,
                    group_id,
                    topics,
                    options,
                    cancel,
                }
                .run(handler)
            })
            .await
    }

    async fn stop(&self) -> TransportResult<()> {
        self.lifecycle.stop().await
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.lifecycle.disconnect().await
    }

    async fn destroy(&self) -> TransportResult<()> {
        self.lifecycle.destroy().await
    }
}

struct ConsumeLoop {
    broker: MemoryBroker,
    group_id: String,
    topics: Vec<String>,
    options: ConsumerOptions,
    cancel: CancellationToken,
}

impl ConsumeLoop {
    async fn run(self, handler: Arc<dyn BatchHandler>) {
        loop {
            let batch = self.next_batch().await;
            if !batch.is_empty() {
                debug!(group_id = %self.group_id, count = batch.len(), "Delivering batch");
                // Not cancellable: a claimed batch is always handled.
                handler.handle_batch(batch).await;
            }
            if self.cancel.is_cancelled() {
                break;
            }
        }
        debug!(group_id = %self.group_id, "Consume loop exited");
    }

    /// Wait for the first message, then fill until full or timed out.
    ///
    /// Returns early (possibly empty) on cancellation.
    async fn next_batch(&self) -> Vec<RawMessage> {
        let max = self.options.batch_size.max(1);
        let mut batch = Vec::new();
        let mut deadline: Option<Instant> = None;

        loop {
            let mut notified = pin!(self.broker.inner.appended.notified());
            notified.as_mut().enable();

            for topic in &self.topics {
                let room = max.saturating_sub(batch.len());
                if room == 0 {
                    break;
                }
                batch.extend(self.broker.fetch(topic, &self.group_id, room));
            }
            if batch.len() >= max {
                return batch;
            }
            if !batch.is_empty() && deadline.is_none() {
                let now = Instant::now();
                deadline = Some(now.checked_add(self.options.batch_timeout).unwrap_or(now));
            }

            tokio::select! {
                () = self.cancel.cancelled() => return batch,
                () = notified.as_mut() => {},
                () = sleep_until_opt(deadline) => return batch,
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
