//! Hosted broker routes.
//!
//! When no remote broker is configured the service hosts its own and lets
//! source applications reach it over HTTP:
//!
//! | route | effect |
//! |-------|--------|
//! | `POST /topics/{topic}/messages` | append messages, reply with their offsets |
//! | `GET /topics/{topic}/messages?group=&max=&waitMs=` | claim unread messages for a consumer group |
//!
//! Bodies are the types in [`custody_transport::wire`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::post;
use axum::{Json, Router};
use custody_transport::wire::{FetchResponse, PublishRequest, PublishResponse, WireRecord};
use custody_transport::{MemoryBroker, OutboundMessage, TransportResult};
use tracing::debug;

use super::ApiState;
use super::error::ApiError;

/// Most messages one fetch may claim.
pub const MAX_FETCH: usize = 1000;

/// Longest a fetch may wait for a message.
pub const MAX_FETCH_WAIT: Duration = Duration::from_secs(10);

/// Fetch size when `max` is absent.
const DEFAULT_FETCH: usize = 100;

/// A [`MemoryBroker`] exposed to other processes, limited to fixed topics.
#[derive(Debug, Clone)]
pub struct BrokerIngress {
    broker: MemoryBroker,
    topics: Arc<[String]>,
}

impl BrokerIngress {
    /// Expose `topics` of `broker`.
    #[must_use]
    pub fn new(broker: MemoryBroker, topics: Vec<String>) -> Self {
        Self {
            broker,
            topics: topics.into(),
        }
    }

    /// The hosted broker.
    #[must_use]
    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    /// Topics accepted over HTTP.
    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    fn check_topic(&self, topic: &str) -> Result<(), ApiError> {
        if self.topics.iter().any(|t| t == topic) {
            Ok(())
        } else {
            Err(ApiError::NotFound)
        }
    }
}

pub(super) fn routes() -> Router<ApiState> {
    Router::new().route("/topics/{topic}/messages", post(publish).get(fetch))
}

async fn publish(
    State(state): State<ApiState>,
    Path(topic): Path<String>,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<Json<PublishResponse>, ApiError> {
    let ingress = state.ingress.as_ref().ok_or(ApiError::NotFound)?;
    ingress.check_topic(&topic)?;
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let messages = request
        .messages
        .into_iter()
        .map(|m| m.into_outbound(&topic))
        .collect::<TransportResult<Vec<OutboundMessage>>>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let offsets: Vec<i64> = messages
        .into_iter()
        .map(|m| ingress.broker.publish(m))
        .collect();

    debug!(topic = %topic, count = offsets.len(), "Accepted published messages");
    Ok(Json(PublishResponse { offsets }))
}

async fn fetch(
    State(state): State<ApiState>,
    Path(topic): Path<String>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Result<Json<FetchResponse>, ApiError> {
    let ingress = state.ingress.as_ref().ok_or(ApiError::NotFound)?;
    ingress.check_topic(&topic)?;
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let group = params
        .get("group")
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .ok_or_else(|| ApiError::BadRequest("group is required".into()))?;
    let max = parse_param(&params, "max")?
        .unwrap_or(DEFAULT_FETCH)
        .clamp(1, MAX_FETCH);
    let wait = parse_param::<u64>(&params, "waitMs")?
        .map_or(Duration::ZERO, Duration::from_millis)
        .min(MAX_FETCH_WAIT);

    let messages = ingress.broker.fetch_wait(&topic, group, max, wait).await;
    if !messages.is_empty() {
        debug!(topic = %topic, group = %group, count = messages.len(), "Served fetch");
    }
    Ok(Json(FetchResponse {
        messages: messages.iter().map(WireRecord::from).collect(),
    }))
}

fn parse_param<T: std::str::FromStr>(
    params: &HashMap<String, String>,
    name: &str,
) -> Result<Option<T>, ApiError> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| ApiError::BadRequest(format!("invalid {name}: '{raw}'")))
        })
        .transpose()
}
