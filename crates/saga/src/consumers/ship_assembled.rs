use std::sync::Arc;

use async_trait::async_trait;
use domain::{DomainEvent, OrderStatus, OrderStore};
use transport::{HandlerResult, Message, MessageHandler};

use crate::orchestrator::OrderOrchestrator;
use crate::services::{PartLookup, PaymentProcessor};

/// Moves orders to `Assembled` when the assembly service reports them built.
pub struct ShipAssembledHandler<S, I, P>
where
    S: OrderStore,
    I: PartLookup,
    P: PaymentProcessor,
{
    orchestrator: Arc<OrderOrchestrator<S, I, P>>,
}

impl<S, I, P> ShipAssembledHandler<S, I, P>
where
    S: OrderStore,
    I: PartLookup,
    P: PaymentProcessor,
{
    pub fn new(orchestrator: Arc<OrderOrchestrator<S, I, P>>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl<S, I, P> MessageHandler for ShipAssembledHandler<S, I, P>
where
    S: OrderStore,
    I: PartLookup,
    P: PaymentProcessor,
{
    #[tracing::instrument(skip_all, fields(topic = %msg.topic, partition = msg.partition, offset = msg.offset))]
    async fn handle(&self, msg: &Message) -> HandlerResult {
        match DomainEvent::decode(&msg.value)? {
            DomainEvent::ShipAssembled(event) => {
                tracing::info!(
                    order_id = %event.order_id,
                    event_id = %event.event_id,
                    build_time_seconds = event.build_time_seconds,
                    "processing ShipAssembled"
                );
                self.orchestrator
                    .update_order_status(event.order_id, OrderStatus::Assembled)
                    .await?;
            }
            other => {
                tracing::debug!(event_type = other.event_type(), "ignoring event");
            }
        }
        Ok(())
    }
}
