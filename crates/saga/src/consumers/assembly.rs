use std::time::Duration;

use async_trait::async_trait;
use common::EventId;
use domain::{DomainEvent, ShipAssembledEvent};
use transport::{HandlerResult, Message, MessageHandler};

use crate::error::SagaError;
use crate::publisher::EventPublisher;

/// Builds paid orders and reports them as assembled.
///
/// The build is simulated by sleeping for `build_time`. When the consumer is
/// shut down mid-build the handler future is dropped, nothing is published
/// and the `OrderPaid` offset stays unmarked.
pub struct AssemblyService {
    publisher: EventPublisher,
    build_time: Duration,
}

impl AssemblyService {
    pub fn new(publisher: EventPublisher, build_time: Duration) -> Self {
        Self {
            publisher,
            build_time,
        }
    }
}

#[async_trait]
impl MessageHandler for AssemblyService {
    #[tracing::instrument(skip_all, fields(topic = %msg.topic, partition = msg.partition, offset = msg.offset))]
    async fn handle(&self, msg: &Message) -> HandlerResult {
        let paid = match DomainEvent::decode(&msg.value)? {
            DomainEvent::OrderPaid(paid) => paid,
            other => {
                tracing::debug!(event_type = other.event_type(), "ignoring event");
                return Ok(());
            }
        };

        tracing::info!(order_id = %paid.order_id, "assembly started");
        tokio::time::sleep(self.build_time).await;

        let assembled = DomainEvent::from(ShipAssembledEvent {
            event_id: EventId::new(),
            order_id: paid.order_id,
            user_id: paid.user_id,
            build_time_seconds: self.build_time.as_secs() as i64,
        });
        self.publisher
            .publish(&assembled)
            .await
            .map_err(SagaError::Publish)?;

        metrics::counter!("ships_assembled_total").increment(1);
        tracing::info!(
            order_id = %paid.order_id,
            event_id = %assembled.event_id(),
            "ship assembled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use common::{OrderId, TransactionId, UserId};
    use domain::{OrderPaidEvent, PaymentMethod};
    use transport::InMemoryBroker;

    fn paid_message(order_id: OrderId) -> Message {
        let event = DomainEvent::from(OrderPaidEvent {
            event_id: EventId::new(),
            order_id,
            user_id: UserId::new(),
            payment_method: PaymentMethod::Card,
            transaction_id: TransactionId::new(),
        });
        Message::builder()
            .topic("order.paid")
            .key(event.key())
            .value(event.encode())
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_assembled_after_build_time() {
        let broker = InMemoryBroker::new();
        let service = AssemblyService::new(
            EventPublisher::new(Arc::new(broker.producer("order.assembled"))),
            Duration::from_secs(10),
        );
        let order_id = OrderId::new();

        service.handle(&paid_message(order_id)).await.unwrap();

        let published = broker.messages("order.assembled");
        assert_eq!(published.len(), 1);
        match DomainEvent::decode(&published[0].value).unwrap() {
            DomainEvent::ShipAssembled(e) => {
                assert_eq!(e.order_id, order_id);
                assert_eq!(e.build_time_seconds, 10);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_payload_is_an_error() {
        let broker = InMemoryBroker::new();
        let service = AssemblyService::new(
            EventPublisher::new(Arc::new(broker.producer("order.assembled"))),
            Duration::ZERO,
        );
        let msg = Message::builder().topic("order.paid").value(vec![0xff, 0x01]).build();

        assert!(service.handle(&msg).await.is_err());
        assert!(broker.messages("order.assembled").is_empty());
    }
}
