//! Message transport for the order fulfillment services.
//!
//! Services exchange opaque byte payloads keyed by order id. A [`Producer`]
//! publishes to one topic; a [`Consumer`] joins a named consumer group and runs
//! a [`MessageHandler`], wrapped in a [`Middleware`] chain, for every record of
//! the partitions assigned to it.
//!
//! Delivery is at-least-once with one deliberate gap: a record whose handler
//! fails is logged and skipped without marking its offset, and once a later
//! record on the same partition is marked the failed one is never redelivered.
//!
//! Two implementations share the contract:
//! - [`KafkaProducer`] / [`KafkaConsumer`] over rdkafka
//! - [`InMemoryBroker`] for single-process runs and tests

pub mod client;
pub mod error;
pub mod handler;
pub mod kafka;
pub mod memory;
pub mod message;
pub mod partitioner;

pub use client::{Consumer, Producer};
pub use error::{Result, TransportError};
pub use handler::{
    BoxError, HandlerResult, LoggingMiddleware, MessageHandler, Middleware, chain, handler_fn,
};
pub use kafka::{KafkaConsumer, KafkaConsumerConfig, KafkaProducer, KafkaProducerConfig};
pub use memory::{InMemoryBroker, MemoryConsumer, MemoryProducer};
pub use message::{Message, MessageBuilder};
