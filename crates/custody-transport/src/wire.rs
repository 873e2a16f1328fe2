//! JSON bodies of the HTTP broker protocol.
//!
//! | request | body |
//! |---------|------|
//! | `POST /topics/{topic}/messages` | [`PublishRequest`] -> [`PublishResponse`] |
//! | `GET /topics/{topic}/messages?group=&max=&waitMs=` | [`FetchResponse`] |
//!
//! Keys and values travel base64-encoded.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::error::{TransportError, TransportResult};
use crate::message::{OutboundMessage, RawMessage};

/// One message in a publish request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Base64 partitioning key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Base64 payload.
    pub value: String,
    /// Message headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl From<&OutboundMessage> for WireMessage {
    fn from(message: &OutboundMessage) -> Self {
        Self {
            key: message.key.as_deref().map(|k| BASE64.encode(k)),
            value: BASE64.encode(&message.value),
            headers: message.headers.clone(),
        }
    }
}

impl WireMessage {
    /// Decode into a message for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] if the key or value is not base64.
    pub fn into_outbound(self, topic: &str) -> TransportResult<OutboundMessage> {
        Ok(OutboundMessage {
            topic: topic.to_string(),
            key: self.key.as_deref().map(|k| decode("key", k)).transpose()?,
            value: decode("value", &self.value)?,
            headers: self.headers,
        })
    }
}

/// Body of `POST /topics/{topic}/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Messages to append, in order.
    pub messages: Vec<WireMessage>,
}

/// Reply to a publish: the offset given to each message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublishResponse {
    /// Offsets, in request order.
    pub offsets: Vec<i64>,
}

/// One delivered message in a fetch reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Topic the message was read from.
    pub topic: String,
    /// Base64 partitioning key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Base64 payload.
    pub value: String,
    /// Broker append time (epoch ms).
    pub timestamp: i64,
    /// Partition the message lives in.
    pub partition: i32,
    /// Position within the partition.
    pub offset: i64,
    /// Message headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl From<&RawMessage> for WireRecord {
    fn from(message: &RawMessage) -> Self {
        Self {
            topic: message.topic.clone(),
            key: message.key.as_deref().map(|k| BASE64.encode(k)),
            value: BASE64.encode(&message.value),
            timestamp: message.timestamp,
            partition: message.partition,
            offset: message.offset,
            headers: message.headers.clone(),
        }
    }
}

impl WireRecord {
    /// Decode into a delivered message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] if the key or value is not base64.
    pub fn into_raw(self) -> TransportResult<RawMessage> {
        Ok(RawMessage {
            key: self.key.as_deref().map(|k| decode("key", k)).transpose()?,
            value: decode("value", &self.value)?,
            topic: self.topic,
            timestamp: self.timestamp,
            partition: self.partition,
            offset: self.offset,
            headers: self.headers,
        })
    }
}

/// Reply to a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FetchResponse {
    /// Claimed messages, oldest first. Empty when the wait ran out.
    pub messages: Vec<WireRecord>,
}

fn decode(field: &str, encoded: &str) -> TransportResult<Vec<u8>> {
    BASE64
        .decode(encoded)
        .map_err(|e| TransportError::Decode(format!("{field} is not base64: {e}")))
}
