//! Broker clients speaking the HTTP broker protocol.
//!
//! A service that hosts a [`MemoryBroker`](crate::MemoryBroker) behind the
//! routes in [`wire`](crate::wire) can be reached from other processes with
//! [`HttpProducer`] and [`HttpConsumer`]. Fetches long-poll: the broker
//! holds the request until a message arrives or the wait runs out.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::consumer::Lifecycle;
use crate::error::{TransportError, TransportResult};
use crate::memory::ConsumerOptions;
use crate::message::{OutboundMessage, RawMessage};
use crate::traits::{BatchHandler, MessageConsumer, MessageProducer};
use crate::wire::{FetchResponse, PublishRequest, PublishResponse, WireMessage, WireRecord};

/// Default long-poll wait of an idle consumer.
pub const DEFAULT_POLL_WAIT: Duration = Duration::from_secs(1);

/// Pause after a failed fetch before polling again.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Timeout of requests that do not long-poll.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Extra time a long-poll request gets on top of its wait.
const POLL_GRACE: Duration = Duration::from_secs(5);

/// Longest error body kept in [`TransportError::Broker`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Clone)]
struct BrokerEndpoint {
    base: Url,
    client: Client,
    bearer_token: Option<String>,
}

impl std::fmt::Debug for BrokerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerEndpoint")
            .field("base", &self.base.as_str())
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

impl BrokerEndpoint {
    fn new(base_url: &str) -> TransportResult<Self> {
        let base = Url::parse(base_url.trim())
            .map_err(|e| TransportError::Connection(format!("invalid broker URL {base_url}: {e}")))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(TransportError::Connection(format!(
                "broker URL {base_url} is not an http(s) base URL"
            )));
        }
        let client = Client::builder()
            .connect_timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self {
            base,
            client,
            bearer_token: None,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Checked in `new`: the base always carries a path.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> TransportResult<Response> {
        let request = match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|&i| body.is_char_boundary(i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        Err(TransportError::Broker {
            status: status.as_u16(),
            body,
        })
    }

    async fn health(&self) -> TransportResult<()> {
        let request = self.client.get(self.url(&["health"])).timeout(REQUEST_TIMEOUT);
        self.send(request).await?;
        Ok(())
    }

    async fn publish(&self, topic: &str, messages: &[OutboundMessage]) -> TransportResult<Vec<i64>> {
        let body = PublishRequest {
            messages: messages.iter().map(WireMessage::from).collect(),
        };
        let request = self
            .client
            .post(self.url(&["topics", topic, "messages"]))
            .timeout(REQUEST_TIMEOUT)
            .json(&body);
        let response = self.send(request).await?;
        let reply: PublishResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(reply.offsets)
    }

    async fn fetch(
        &self,
        topic: &str,
        group: &str,
        max: usize,
        wait: Duration,
    ) -> TransportResult<Vec<RawMessage>> {
        let wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        let request = self
            .client
            .get(self.url(&["topics", topic, "messages"]))
            .query(&[
                ("group", group.to_string()),
                ("max", max.to_string()),
                ("waitMs", wait_ms.to_string()),
            ])
            .timeout(wait.saturating_add(POLL_GRACE));
        let response = self.send(request).await?;
        let reply: FetchResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        reply.messages.into_iter().map(WireRecord::into_raw).collect()
    }
}

/// Producer publishing to a remote broker over HTTP.
#[derive(Debug)]
pub struct HttpProducer {
    endpoint: BrokerEndpoint,
    connected: Mutex<bool>,
}

impl HttpProducer {
    /// Create a producer for the broker at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connection`] if the URL is not an http(s)
    /// base URL or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> TransportResult<Self> {
        Ok(Self {
            endpoint: BrokerEndpoint::new(base_url)?,
            connected: Mutex::new(false),
        })
    }

    /// Present `Authorization: Bearer <token>` on every request.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.endpoint.bearer_token = Some(token.into());
        self
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_connected(&self, value: bool) {
        *self.connected.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

#[async_trait]
impl MessageProducer for HttpProducer {
    async fn connect(&self) -> TransportResult<()> {
        self.endpoint.health().await?;
        info!(broker = %self.endpoint.base, "Producer connected");
        self.set_connected(true);
        Ok(())
    }

    /// Publishes runs of same-topic messages in one request each, keeping
    /// the overall order.
    async fn send(&self, messages: Vec<OutboundMessage>) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        for run in messages.chunk_by(|a, b| a.topic == b.topic) {
            let Some(first) = run.first() else {
                continue;
            };
            let offsets = self
                .endpoint
                .publish(&first.topic, run)
                .await
                .map_err(|e| TransportError::Publish(e.to_string()))?;
            debug!(topic = %first.topic, offsets = ?offsets, "Published to remote broker");
        }
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.set_connected(false);
        Ok(())
    }
}

/// Consumer-group member long-polling a remote broker over HTTP.
#[derive(Debug)]
pub struct HttpConsumer {
    endpoint: BrokerEndpoint,
    topics: Vec<String>,
    options: ConsumerOptions,
    poll_wait: Duration,
    lifecycle: Lifecycle,
}

impl HttpConsumer {
    /// Create a consumer for `topics` in group `group_id` on the broker at
    /// `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connection`] if the URL is not an http(s)
    /// base URL or the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        group_id: impl Into<String>,
        topics: Vec<String>,
        options: ConsumerOptions,
    ) -> TransportResult<Self> {
        Ok(Self {
            endpoint: BrokerEndpoint::new(base_url)?,
            topics,
            options,
            poll_wait: DEFAULT_POLL_WAIT,
            lifecycle: Lifecycle::new(group_id.into()),
        })
    }

    /// Present `Authorization: Bearer <token>` on every request.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.endpoint.bearer_token = Some(token.into());
        self
    }

    /// How long an idle poll waits for a message. Stopping the consumer
    /// can take up to this long.
    #[must_use]
    pub fn with_poll_wait(mut self, wait: Duration) -> Self {
        self.poll_wait = wait;
        self
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
impl MessageConsumer for HttpConsumer {
    async fn connect(&self) -> TransportResult<()> {
        self.lifecycle.ensure_usable().await?;
        self.endpoint.health().await?;
        info!(broker = %self.endpoint.base, group_id = %self.group_id(), "Consumer connected");
        self.lifecycle.connect().await
    }

    async fn start(&self, handler: Arc<dyn BatchHandler>) -> TransportResult<()> {
        let endpoint = self.endpoint.clone();
        let group_id = self.group_id().to_string();
        let topics = self.topics.clone();
        let options = self.options;
        let poll_wait = self.poll_wait;
        self.lifecycle
            .start(&self.topics, move |cancel| {
                PollLoop {
                    endpoint,
                    group_id,
                    topics,
                    options,
                    poll_wait,
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

struct PollLoop {
    endpoint: BrokerEndpoint,
    group_id: String,
    topics: Vec<String>,
    options: ConsumerOptions,
    poll_wait: Duration,
    cancel: CancellationToken,
}

impl PollLoop {
    async fn run(self, handler: Arc<dyn BatchHandler>) {
        if self.topics.is_empty() {
            self.cancel.cancelled().await;
            return;
        }
        loop {
            let batch = self.next_batch().await;
            if !batch.is_empty() {
                debug!(group_id = %self.group_id, count = batch.len(), "Delivering batch");
                handler.handle_batch(batch).await;
            }
            if self.cancel.is_cancelled() {
                break;
            }
        }
        debug!(group_id = %self.group_id, "Poll loop exited");
    }

    /// Poll until the first message, then keep polling until the batch is
    /// full or timed out.
    ///
    /// A poll in flight is never abandoned: the broker may already have
    /// claimed its messages for this group.
    async fn next_batch(&self) -> Vec<RawMessage> {
        let max = self.options.batch_size.max(1);
        let topic_count = u32::try_from(self.topics.len()).unwrap_or(u32::MAX);
        let idle_wait = self.poll_wait.checked_div(topic_count).unwrap_or(self.poll_wait);
        let mut batch = Vec::new();
        let mut deadline: Option<Instant> = None;

        loop {
            for topic in &self.topics {
                let room = max.saturating_sub(batch.len());
                if room == 0 {
                    return batch;
                }
                let wait =
                    deadline.map_or(idle_wait, |at| at.saturating_duration_since(Instant::now()));
                match self.endpoint.fetch(topic, &self.group_id, room, wait).await {
                    Ok(messages) => batch.extend(messages),
                    Err(e) => {
                        warn!(group_id = %self.group_id, topic = %topic, error = %e, "Broker fetch failed");
                        if batch.is_empty() {
                            self.back_off().await;
                        }
                        return batch;
                    },
                }
                if !batch.is_empty() && deadline.is_none() {
                    let now = Instant::now();
                    deadline = Some(now.checked_add(self.options.batch_timeout).unwrap_or(now));
                }
            }
            if batch.len() >= max
                || self.cancel.is_cancelled()
                || deadline.is_some_and(|at| Instant::now() >= at)
            {
                return batch;
            }
        }
    }

    async fn back_off(&self) {
        tokio::select! {
            () = self.cancel.cancelled() => {},
            () = tokio::time::sleep(RETRY_DELAY) => {},
        }
    }
}
