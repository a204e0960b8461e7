//! Order orchestrator driving the synchronous half of the fulfillment saga.

use std::future::Future;
use std::time::Duration;

use common::{EventId, OrderId, PartId, TransactionId, UserId};
use domain::{DomainEvent, Money, Order, OrderPaidEvent, OrderStatus, OrderStore, PaymentMethod};

use crate::error::{Result, SagaError};
use crate::publisher::EventPublisher;
use crate::services::{PartLookup, PartsFilter, PaymentProcessor, PaymentRequest};

/// Per-call deadlines for the synchronous collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub inventory_timeout: Duration,
    pub payment_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            inventory_timeout: Duration::from_secs(3),
            payment_timeout: Duration::from_secs(5),
        }
    }
}

/// Creates, pays, cancels and updates orders.
///
/// Early transitions are driven by synchronous calls to the inventory and
/// payment collaborators. Payment hands the saga over to the event side by
/// publishing an [`OrderPaidEvent`]; the assembled transition comes back
/// through [`update_order_status`](Self::update_order_status).
pub struct OrderOrchestrator<S, I, P>
where
    S: OrderStore,
    I: PartLookup,
    P: PaymentProcessor,
{
    store: S,
    inventory: I,
    payment: P,
    publisher: EventPublisher,
    config: OrchestratorConfig,
}

impl<S, I, P> OrderOrchestrator<S, I, P>
where
    S: OrderStore,
    I: PartLookup,
    P: PaymentProcessor,
{
    /// Creates a new orchestrator with the default timeouts.
    pub fn new(store: S, inventory: I, payment: P, publisher: EventPublisher) -> Self {
        Self::with_config(
            store,
            inventory,
            payment,
            publisher,
            OrchestratorConfig::default(),
        )
    }

    pub fn with_config(
        store: S,
        inventory: I,
        payment: P,
        publisher: EventPublisher,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            inventory,
            payment,
            publisher,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> OrchestratorConfig {
        self.config
    }

    /// Prices every part and persists a new order awaiting payment.
    ///
    /// Nothing is persisted unless every part resolves.
    #[tracing::instrument(skip(self, part_ids), fields(parts = part_ids.len()))]
    pub async fn create_order(&self, user_id: UserId, part_ids: Vec<PartId>) -> Result<Order> {
        if part_ids.is_empty() {
            return Err(domain::OrderError::NoParts.into());
        }

        let mut total_price = Money::zero();
        for part_id in &part_ids {
            let price = self.resolve_price(*part_id).await?;
            total_price = total_price
                .checked_add(price)
                .ok_or(domain::OrderError::TotalOverflow)?;
        }

        let order = Order::new(user_id, part_ids, total_price)?;
        self.store.create(&order).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id(), total_price = %total_price, "order created");
        Ok(order)
    }

    /// Loads an order.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        Ok(self.store.get(order_id).await?)
    }

    /// Charges a pending order, marks it paid and publishes `OrderPaid`.
    ///
    /// The update and the publish are separate steps. If the publish fails the
    /// order stays paid and the error is returned; nothing is rolled back.
    #[tracing::instrument(skip_all, fields(%order_id))]
    pub async fn pay_order(
        &self,
        order_id: OrderId,
        user_id: Option<UserId>,
        payment_method: PaymentMethod,
    ) -> Result<Order> {
        let mut order = self.store.get(order_id).await?;
        order.ensure_payable()?;

        let request = PaymentRequest {
            order_id,
            user_id: user_id.unwrap_or_else(|| order.user_id()),
            payment_method,
        };
        let transaction_id: TransactionId = with_timeout(
            "payment",
            self.config.payment_timeout,
            self.payment.pay_order(request),
        )
        .await?;

        order.pay(transaction_id, payment_method)?;
        if let Err(e) = self.store.update(&mut order).await {
            // The charge went through but no paid order or event records it.
            metrics::counter!("orphaned_payments_total").increment(1);
            tracing::error!(
                %transaction_id,
                error = %e,
                "payment taken but order could not be marked paid"
            );
            return Err(e.into());
        }
        metrics::counter!("orders_paid_total").increment(1);
        tracing::info!(%transaction_id, %payment_method, "order paid");

        let event = DomainEvent::from(OrderPaidEvent {
            event_id: EventId::new(),
            order_id,
            user_id: order.user_id(),
            payment_method,
            transaction_id,
        });
        if let Err(e) = self.publisher.publish(&event).await {
            metrics::counter!("order_paid_publish_failures_total").increment(1);
            tracing::error!(error = %e, "order persisted as paid but OrderPaid was not published");
            return Err(SagaError::Publish(e));
        }

        Ok(order)
    }

    /// Cancels an order that has not been paid yet.
    #[tracing::instrument(skip_all, fields(%order_id))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self.store.get(order_id).await?;
        order.cancel()?;
        self.store.update(&mut order).await?;

        metrics::counter!("orders_canceled_total").increment(1);
        tracing::info!("order canceled");
        Ok(order)
    }

    /// Overwrites an order's status on behalf of an event consumer.
    ///
    /// No transition guard applies: an `Assembled` update lands even on a
    /// canceled order.
    #[tracing::instrument(skip_all, fields(%order_id, %status))]
    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order> {
        let mut order = self.store.get(order_id).await?;
        let previous = order.overwrite_status(status);
        if previous == OrderStatus::Canceled && status != OrderStatus::Canceled {
            tracing::warn!(%previous, "overwriting status of a canceled order");
        }
        self.store.update(&mut order).await?;

        if status == OrderStatus::Assembled {
            metrics::counter!("orders_assembled_total").increment(1);
        }
        tracing::info!(%previous, "order status updated");
        Ok(order)
    }

    async fn resolve_price(&self, part_id: PartId) -> Result<Money> {
        let filter = PartsFilter::by_id(part_id);
        let parts = with_timeout(
            "inventory",
            self.config.inventory_timeout,
            self.inventory.list_parts(&filter),
        )
        .await?;

        parts
            .into_iter()
            .find(|p| p.id == part_id)
            .map(|p| p.price)
            .ok_or(SagaError::PartNotFound(part_id))
    }
}

async fn with_timeout<T>(
    service: &'static str,
    after: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                service,
                timeout_ms = after.as_millis() as u64,
                "collaborator timed out"
            );
            Err(SagaError::Timeout { service, after })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use domain::InMemoryOrderStore;
    use transport::InMemoryBroker;

    use crate::services::{InMemoryPartLookup, InMemoryPaymentProcessor, Part};

    struct Fixture {
        orchestrator:
            OrderOrchestrator<InMemoryOrderStore, InMemoryPartLookup, InMemoryPaymentProcessor>,
        broker: InMemoryBroker,
        inventory: InMemoryPartLookup,
        payment: InMemoryPaymentProcessor,
        engine: PartId,
        wing: PartId,
    }

    fn fixture() -> Fixture {
        let engine = PartId::new();
        let wing = PartId::new();
        let inventory = InMemoryPartLookup::with_parts([
            Part::new(engine, "Ion engine", Money::from_dollars(10)),
            Part::new(wing, "Delta wing", Money::from_dollars(15)),
        ]);
        let payment = InMemoryPaymentProcessor::new();
        let broker = InMemoryBroker::new();
        let publisher = EventPublisher::new(Arc::new(broker.producer("order.paid")));
        let orchestrator = OrderOrchestrator::new(
            InMemoryOrderStore::new(),
            inventory.clone(),
            payment.clone(),
            publisher,
        );
        Fixture {
            orchestrator,
            broker,
            inventory,
            payment,
            engine,
            wing,
        }
    }

    #[tokio::test]
    async fn test_create_order_sums_prices() {
        let f = fixture();

        let order = f
            .orchestrator
            .create_order(UserId::new(), vec![f.engine, f.wing, f.engine])
            .await
            .unwrap();

        assert_eq!(order.total_price(), Money::from_dollars(35));
        assert_eq!(order.status(), OrderStatus::PendingPayment);
        assert_eq!(f.inventory.call_count(), 3);
        assert_eq!(f.orchestrator.store().order_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_order_without_parts_fails() {
        let f = fixture();
        let result = f.orchestrator.create_order(UserId::new(), vec![]).await;
        assert!(matches!(result, Err(SagaError::Validation(_))));
        assert_eq!(f.inventory.call_count(), 0);
    }

    #[tokio::test]
    async fn test_inventory_failure_aborts_create() {
        let f = fixture();
        f.inventory.set_fail_on_list(true);

        let result = f
            .orchestrator
            .create_order(UserId::new(), vec![f.engine])
            .await;

        assert!(matches!(result, Err(SagaError::Inventory(_))));
        assert_eq!(f.orchestrator.store().order_count().await, 0);
    }

    #[tokio::test]
    async fn test_pay_uses_order_owner_when_user_omitted() {
        let f = fixture();
        let owner = UserId::new();
        let order = f
            .orchestrator
            .create_order(owner, vec![f.wing])
            .await
            .unwrap();

        let paid = f
            .orchestrator
            .pay_order(order.id(), None, PaymentMethod::InvestorMoney)
            .await
            .unwrap();

        let tx = paid.transaction_id().unwrap();
        assert_eq!(f.payment.payment(tx).unwrap().user_id, owner);
        assert_eq!(paid.version(), 1);
    }

    #[tokio::test]
    async fn test_payment_failure_leaves_order_pending() {
        let f = fixture();
        let order = f
            .orchestrator
            .create_order(UserId::new(), vec![f.wing])
            .await
            .unwrap();
        f.payment.set_fail_on_pay(true);

        let result = f
            .orchestrator
            .pay_order(order.id(), None, PaymentMethod::Card)
            .await;

        assert!(matches!(result, Err(SagaError::Payment(_))));
        let stored = f.orchestrator.get_order(order.id()).await.unwrap();
        assert_eq!(stored.status(), OrderStatus::PendingPayment);
        assert!(f.broker.messages("order.paid").is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_order_paid() {
        let f = fixture();
        let order = f
            .orchestrator
            .create_order(UserId::new(), vec![f.wing])
            .await
            .unwrap();
        f.broker.set_unavailable(true);

        let result = f
            .orchestrator
            .pay_order(order.id(), None, PaymentMethod::Card)
            .await;

        assert!(matches!(result, Err(SagaError::Publish(_))));
        let stored = f.orchestrator.get_order(order.id()).await.unwrap();
        assert_eq!(stored.status(), OrderStatus::Paid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pay_losing_race_to_cancel_reports_conflict() {
        let f = fixture();
        let order = f
            .orchestrator
            .create_order(UserId::new(), vec![f.wing])
            .await
            .unwrap();
        f.payment.set_delay(Some(Duration::from_secs(1)));

        let (paid, canceled) = tokio::join!(
            f.orchestrator.pay_order(order.id(), None, PaymentMethod::Card),
            f.orchestrator.cancel_order(order.id()),
        );

        canceled.unwrap();
        assert!(matches!(
            paid,
            Err(SagaError::Store(domain::StoreError::VersionConflict { .. }))
        ));
        // The processor charged the order even though it was never marked paid.
        assert_eq!(f.payment.payment_count(), 1);
        let stored = f.orchestrator.get_order(order.id()).await.unwrap();
        assert_eq!(stored.status(), OrderStatus::Canceled);
        assert!(stored.transaction_id().is_none());
        assert!(f.broker.messages("order.paid").is_empty());
    }

    #[tokio::test]
    async fn test_overflowing_total_is_rejected() {
        let f = fixture();
        let priceless = PartId::new();
        f.inventory.insert(Part::new(
            priceless,
            "Crown jewel hull",
            Money::from_cents(i64::MAX),
        ));

        let result = f
            .orchestrator
            .create_order(UserId::new(), vec![priceless, f.engine])
            .await;

        assert!(matches!(
            result,
            Err(SagaError::Validation(domain::OrderError::TotalOverflow))
        ));
        assert_eq!(f.orchestrator.store().order_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let f = fixture();
        let id = OrderId::new();

        assert!(matches!(
            f.orchestrator.get_order(id).await,
            Err(SagaError::OrderNotFound(got)) if got == id
        ));
        assert!(matches!(
            f.orchestrator.cancel_order(id).await,
            Err(SagaError::OrderNotFound(_))
        ));
        assert!(matches!(
            f.orchestrator.update_order_status(id, OrderStatus::Assembled).await,
            Err(SagaError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_store_outage_is_a_store_error() {
        let f = fixture();
        f.orchestrator.store().set_unavailable(true).await;

        let result = f
            .orchestrator
            .create_order(UserId::new(), vec![f.engine])
            .await;
        assert!(matches!(result, Err(SagaError::Store(_))));
    }
}
