//! Domain error types.

use common::OrderId;
use thiserror::Error;

/// Errors that can occur when persisting or loading orders.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No order exists with the given id.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// An order with the given id was already created.
    #[error("Order already exists: {0}")]
    AlreadyExists(OrderId),

    /// The stored order changed since it was loaded.
    #[error("Version conflict for order {order_id}: expected version {expected}, found {actual}")]
    VersionConflict {
        order_id: OrderId,
        expected: i64,
        actual: i64,
    },

    /// A stored row could not be mapped back to an order.
    #[error("Corrupted order record: {0}")]
    Corrupted(String),

    /// The store is unreachable.
    #[error("Order store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised while decoding an event payload from the wire.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes are not a valid event envelope.
    #[error("Malformed event payload: {0}")]
    Malformed(#[from] prost::DecodeError),

    /// The envelope carries no event.
    #[error("Event envelope has no payload")]
    MissingPayload,

    /// An identifier field is not a valid UUID.
    #[error("Invalid {field} in event: {source}")]
    InvalidId {
        field: &'static str,
        #[source]
        source: uuid::Error,
    },

    /// A numeric field is out of range.
    #[error("Invalid {field} in event: {value}")]
    InvalidValue { field: &'static str, value: i64 },
}
