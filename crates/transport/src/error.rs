use thiserror::Error;

/// Errors that can occur when producing to or consuming from a broker.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The Kafka client reported an error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// The broker could not be reached.
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// The consumer group was closed while a consumer was attached to it.
    #[error("Consumer group closed: {group_id}")]
    GroupClosed { group_id: String },

    /// The transport was configured with invalid settings.
    #[error("Invalid transport configuration: {0}")]
    Config(String),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
