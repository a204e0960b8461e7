use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// A delivered record: the unit of work handed to message handlers.
///
/// Produced by the transport on receive and never mutated by handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Routing key; messages with equal keys land on the same partition.
    pub key: Vec<u8>,

    /// Opaque payload bytes.
    pub value: Vec<u8>,

    /// Topic the message was read from.
    pub topic: String,

    /// Partition within the topic.
    pub partition: i32,

    /// Offset of the message within its partition.
    pub offset: i64,

    /// Broker-assigned (or producer-assigned) timestamp.
    pub timestamp: DateTime<Utc>,

    /// Record headers.
    pub headers: HashMap<String, Vec<u8>>,
}

impl Message {
    /// Creates a new message builder.
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Returns the key as UTF-8, if it is valid UTF-8.
    pub fn key_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.key).ok()
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers.get(name).map(Vec::as_slice)
    }
}

/// Builder for constructing messages, mostly useful for brokers and tests.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    key: Vec<u8>,
    value: Vec<u8>,
    topic: Option<String>,
    partition: i32,
    offset: i64,
    timestamp: Option<DateTime<Utc>>,
    headers: HashMap<String, Vec<u8>>,
}

impl MessageBuilder {
    /// Sets the routing key.
    pub fn key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = key.into();
        self
    }

    /// Sets the payload.
    pub fn value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }

    /// Sets the topic.
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Sets the partition.
    pub fn partition(mut self, partition: i32) -> Self {
        self.partition = partition;
        self
    }

    /// Sets the offset.
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Builds the message.
    pub fn build(self) -> Message {
        Message {
            key: self.key,
            value: self.value,
            topic: self.topic.unwrap_or_default(),
            partition: self.partition,
            offset: self.offset,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            headers: self.headers,
        }
    }
}
