use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use common::UserId;
use domain::{DomainEvent, OrderPaidEvent, ShipAssembledEvent};
use transport::{HandlerResult, Message, MessageHandler};

use crate::error::SagaError;

/// Delivers a rendered notification to a user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: UserId, text: &str) -> Result<(), SagaError>;
}

/// Writes notifications to the log instead of a chat.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, user_id: UserId, text: &str) -> Result<(), SagaError> {
        tracing::info!(%user_id, text, "notification sent");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<(UserId, String)>,
    fail: bool,
}

/// Records notifications in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every delivery fail.
    pub fn set_fail(&self, fail: bool) {
        self.lock().fail = fail;
    }

    /// Notifications delivered so far, oldest first.
    pub fn messages(&self) -> Vec<(UserId, String)> {
        self.lock().sent.clone()
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryNotifierState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, user_id: UserId, text: &str) -> Result<(), SagaError> {
        let mut state = self.lock();
        if state.fail {
            return Err(SagaError::Notification("chat unavailable".to_string()));
        }
        state.sent.push((user_id, text.to_string()));
        Ok(())
    }
}

/// Tells users when their order is paid and when their ship is built.
pub struct NotificationService<N: Notifier> {
    notifier: N,
}

impl<N: Notifier> NotificationService<N> {
    pub fn new(notifier: N) -> Self {
        Self { notifier }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }
}

fn render_paid(event: &OrderPaidEvent) -> String {
    format!(
        "Order {} is paid.\nPayment method: {}\nTransaction: {}",
        event.order_id, event.payment_method, event.transaction_id
    )
}

fn render_assembled(event: &ShipAssembledEvent) -> String {
    format!(
        "Your ship for order {} is assembled.\nBuild time: {}s",
        event.order_id, event.build_time_seconds
    )
}

#[async_trait]
impl<N: Notifier> MessageHandler for NotificationService<N> {
    #[tracing::instrument(skip_all, fields(topic = %msg.topic, partition = msg.partition, offset = msg.offset))]
    async fn handle(&self, msg: &Message) -> HandlerResult {
        let event = DomainEvent::decode(&msg.value)?;
        let (user_id, text) = match &event {
            DomainEvent::OrderPaid(e) => (e.user_id, render_paid(e)),
            DomainEvent::ShipAssembled(e) => (e.user_id, render_assembled(e)),
        };

        if let Err(e) = self.notifier.notify(user_id, &text).await {
            tracing::error!(error = %e, order_id = %event.order_id(), "notification failed");
            return Err(e.into());
        }
        metrics::counter!("notifications_sent_total", "event_type" => event.event_type())
            .increment(1);
        Ok(())
    }
}
