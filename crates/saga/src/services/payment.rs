//! Payment processor trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, TransactionId, UserId};
use domain::PaymentMethod;

use crate::error::SagaError;

/// A charge request sent to the payment collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub payment_method: PaymentMethod,
}

/// Synchronous payment collaborator.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Charges for an order and returns the transaction id.
    async fn pay_order(&self, request: PaymentRequest) -> Result<TransactionId, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    payments: HashMap<TransactionId, PaymentRequest>,
    fail_on_pay: bool,
    delay: Option<Duration>,
}

/// In-memory payment processor that mints a transaction id per charge.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentProcessor {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentProcessor {
    /// Creates a new in-memory payment processor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the processor to decline every charge.
    pub fn set_fail_on_pay(&self, fail: bool) {
        self.write().fail_on_pay = fail;
    }

    /// Delays every charge, to simulate a slow payment gateway.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    /// Returns the number of successful charges.
    pub fn payment_count(&self) -> usize {
        self.read().payments.len()
    }

    /// Returns the request behind a transaction, if it exists.
    pub fn payment(&self, transaction_id: TransactionId) -> Option<PaymentRequest> {
        self.read().payments.get(&transaction_id).cloned()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryPaymentState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryPaymentState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl PaymentProcessor for InMemoryPaymentProcessor {
    async fn pay_order(&self, request: PaymentRequest) -> Result<TransactionId, SagaError> {
        let delay = self.read().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.write();
        if state.fail_on_pay {
            return Err(SagaError::Payment("Payment declined".to_string()));
        }

        let transaction_id = TransactionId::new();
        state.payments.insert(transaction_id, request);
        Ok(transaction_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PaymentRequest {
        PaymentRequest {
            order_id: OrderId::new(),
            user_id: UserId::new(),
            payment_method: PaymentMethod::Card,
        }
    }

    #[tokio::test]
    async fn test_pay_records_transaction() {
        let processor = InMemoryPaymentProcessor::new();
        let req = request();

        let tx = processor.pay_order(req.clone()).await.unwrap();

        assert_eq!(processor.payment_count(), 1);
        assert_eq!(processor.payment(tx), Some(req));
    }

    #[tokio::test]
    async fn test_each_charge_gets_its_own_transaction() {
        let processor = InMemoryPaymentProcessor::new();
        let a = processor.pay_order(request()).await.unwrap();
        let b = processor.pay_order(request()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_fail_on_pay() {
        let processor = InMemoryPaymentProcessor::new();
        processor.set_fail_on_pay(true);

        let result = processor.pay_order(request()).await;
        assert!(matches!(result, Err(SagaError::Payment(_))));
        assert_eq!(processor.payment_count(), 0);
    }
}
