//! Saga error types.

use std::time::Duration;

use common::{OrderId, PartId};
use domain::{DecodeError, OrderError, StoreError};
use thiserror::Error;
use transport::TransportError;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The inventory has no part with this id.
    #[error("Part not found: {0}")]
    PartNotFound(PartId),

    /// The order's status does not allow the operation.
    #[error("{0}")]
    InvalidState(OrderError),

    /// The request itself is invalid.
    #[error("Invalid request: {0}")]
    Validation(OrderError),

    /// Inventory service error.
    #[error("Inventory service error: {0}")]
    Inventory(String),

    /// Payment service error.
    #[error("Payment service error: {0}")]
    Payment(String),

    /// A collaborator did not answer in time.
    #[error("{service} service timed out after {after:?}")]
    Timeout {
        service: &'static str,
        after: Duration,
    },

    /// An event could not be published.
    #[error("Event publish failed: {0}")]
    Publish(#[source] TransportError),

    /// Notification delivery failed.
    #[error("Notification failed: {0}")]
    Notification(String),

    /// Order store error.
    #[error("Order store error: {0}")]
    Store(StoreError),

    /// A consumed event could not be decoded.
    #[error("Malformed event: {0}")]
    Decode(#[from] DecodeError),
}

impl SagaError {
    /// Returns true if the failure came from a remote collaborator or the broker.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            SagaError::Inventory(_)
                | SagaError::Payment(_)
                | SagaError::Timeout { .. }
                | SagaError::Publish(_)
                | SagaError::Notification(_)
        )
    }
}

impl From<StoreError> for SagaError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => SagaError::OrderNotFound(id),
            other => SagaError::Store(other),
        }
    }
}

impl From<OrderError> for SagaError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::InvalidStateTransition { .. } => SagaError::InvalidState(e),
            other => SagaError::Validation(other),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use domain::OrderStatus;

    #[test]
    fn test_store_not_found_maps_to_order_not_found() {
        let id = OrderId::new();
        let err = SagaError::from(StoreError::NotFound(id));
        assert!(matches!(err, SagaError::OrderNotFound(got) if got == id));
    }

    #[test]
    fn test_guard_violation_maps_to_invalid_state() {
        let err = SagaError::from(OrderError::InvalidStateTransition {
            current: OrderStatus::Paid,
            action: "cancel",
        });
        assert!(matches!(err, SagaError::InvalidState(_)));
        assert_eq!(
            err.to_string(),
            "Invalid state transition: cannot cancel from paid status"
        );

        assert!(matches!(
            SagaError::from(OrderError::NoParts),
            SagaError::Validation(_)
        ));
    }

    #[test]
    fn test_upstream_classification() {
        assert!(SagaError::Payment("declined".into()).is_upstream());
        assert!(
            SagaError::Timeout {
                service: "inventory",
                after: Duration::from_secs(3)
            }
            .is_upstream()
        );
        assert!(!SagaError::OrderNotFound(OrderId::new()).is_upstream());
    }
}
