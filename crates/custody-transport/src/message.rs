//! Transport messages.

use std::collections::BTreeMap;

/// A message as delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Topic the message was read from.
    pub topic: String,
    /// Optional partitioning key.
    pub key: Option<Vec<u8>>,
    /// Payload bytes.
    pub value: Vec<u8>,
    /// Broker append time (epoch ms).
    pub timestamp: i64,
    /// Partition the message lives in.
    pub partition: i32,
    /// Position within the partition.
    pub offset: i64,
    /// Message headers.
    pub headers: BTreeMap<String, String>,
}

/// A message handed to a producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Destination topic.
    pub topic: String,
    /// Optional partitioning key.
    pub key: Option<Vec<u8>>,
    /// Payload bytes.
    pub value: Vec<u8>,
    /// Message headers.
    pub headers: BTreeMap<String, String>,
}

impl OutboundMessage {
    /// A keyless message without headers.
    #[must_use]
    pub fn new(topic: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            value,
            headers: BTreeMap::new(),
        }
    }

    /// Attach a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}
