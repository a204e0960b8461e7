//! Publishing saga events onto a transport topic.

use std::sync::Arc;

use domain::DomainEvent;
use transport::{Producer, TransportError};

/// Encodes domain events and publishes them keyed by order id.
#[derive(Clone)]
pub struct EventPublisher {
    producer: Arc<dyn Producer>,
}

impl EventPublisher {
    pub fn new(producer: Arc<dyn Producer>) -> Self {
        Self { producer }
    }

    /// Publishes one event; returns once the broker acknowledged it.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id(), event_type = event.event_type()))]
    pub async fn publish(&self, event: &DomainEvent) -> Result<(), TransportError> {
        self.producer.send(&event.key(), &event.encode()).await?;
        tracing::debug!(event_id = %event.event_id(), "event published");
        Ok(())
    }
}
