//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{OrderId, PartId, TransactionId, UserId};
use serde::{Deserialize, Serialize};

use super::{Money, OrderError, OrderStatus, PaymentMethod};

/// Order aggregate root.
///
/// Identity, owner, parts and price are fixed at creation. Payment details are
/// written once by [`Order::pay`]; afterwards only the status moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub(crate) id: OrderId,
    pub(crate) user_id: UserId,
    pub(crate) part_ids: Vec<PartId>,
    pub(crate) total_price: Money,
    pub(crate) payment_method: PaymentMethod,
    pub(crate) transaction_id: Option<TransactionId>,
    pub(crate) status: OrderStatus,

    /// Store version for optimistic concurrency; 0 until first persisted update.
    pub(crate) version: i64,

    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a priced order awaiting payment.
    pub fn new(
        user_id: UserId,
        part_ids: Vec<PartId>,
        total_price: Money,
    ) -> Result<Self, OrderError> {
        if part_ids.is_empty() {
            return Err(OrderError::NoParts);
        }
        if total_price.is_negative() {
            return Err(OrderError::NegativeTotal(total_price));
        }

        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            user_id,
            part_ids,
            total_price,
            payment_method: PaymentMethod::Unknown,
            transaction_id: None,
            status: OrderStatus::PendingPayment,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Checks the payment guard without changing the order.
    pub fn ensure_payable(&self) -> Result<(), OrderError> {
        if self.status.can_pay() {
            Ok(())
        } else {
            Err(OrderError::InvalidStateTransition {
                current: self.status,
                action: "pay",
            })
        }
    }

    /// Records a successful charge and moves the order to `Paid`.
    pub fn pay(
        &mut self,
        transaction_id: TransactionId,
        payment_method: PaymentMethod,
    ) -> Result<(), OrderError> {
        self.ensure_payable()?;
        self.transaction_id = Some(transaction_id);
        self.payment_method = payment_method;
        self.status = OrderStatus::Paid;
        self.touch();
        Ok(())
    }

    /// Cancels an unpaid order.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidStateTransition {
                current: self.status,
                action: "cancel",
            });
        }
        self.status = OrderStatus::Canceled;
        self.touch();
        Ok(())
    }

    /// Sets the status without any guard and returns the previous one.
    ///
    /// Used for event-driven updates: an assembled event moves the order to
    /// `Assembled` even if it was canceled in the meantime.
    pub fn overwrite_status(&mut self, status: OrderStatus) -> OrderStatus {
        let previous = std::mem::replace(&mut self.status, status);
        self.touch();
        previous
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn part_ids(&self) -> &[PartId] {
        &self.part_ids
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns the store version this copy was loaded at.
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the order is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_order() -> Order {
        Order::new(
            UserId::new(),
            vec![PartId::new(), PartId::new()],
            Money::from_dollars(25),
        )
        .unwrap()
    }

    #[test]
    fn test_new_order_awaits_payment() {
        let order = pending_order();
        assert_eq!(order.status(), OrderStatus::PendingPayment);
        assert_eq!(order.total_price(), Money::from_dollars(25));
        assert_eq!(order.part_ids().len(), 2);
        assert_eq!(order.transaction_id(), None);
        assert_eq!(order.payment_method(), PaymentMethod::Unknown);
        assert_eq!(order.version(), 0);
    }

    #[test]
    fn test_new_order_requires_parts() {
        let result = Order::new(UserId::new(), vec![], Money::zero());
        assert_eq!(result.unwrap_err(), OrderError::NoParts);
    }

    #[test]
    fn test_new_order_rejects_negative_total() {
        let result = Order::new(UserId::new(), vec![PartId::new()], Money::from_cents(-1));
        assert!(matches!(result, Err(OrderError::NegativeTotal(_))));
    }

    #[test]
    fn test_pay_sets_transaction_and_method() {
        let mut order = pending_order();
        let tx = TransactionId::new();

        order.pay(tx, PaymentMethod::Card).unwrap();

        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(order.transaction_id(), Some(tx));
        assert_eq!(order.payment_method(), PaymentMethod::Card);
    }

    #[test]
    fn test_pay_twice_is_rejected_and_keeps_first_transaction() {
        let mut order = pending_order();
        let first = TransactionId::new();
        order.pay(first, PaymentMethod::Card).unwrap();

        let err = order
            .pay(TransactionId::new(), PaymentMethod::CreditCard)
            .unwrap_err();

        assert_eq!(
            err,
            OrderError::InvalidStateTransition {
                current: OrderStatus::Paid,
                action: "pay",
            }
        );
        assert_eq!(order.transaction_id(), Some(first));
        assert_eq!(order.payment_method(), PaymentMethod::Card);
    }

    #[test]
    fn test_canceled_order_cannot_be_paid() {
        let mut order = pending_order();
        order.cancel().unwrap();

        assert!(order.ensure_payable().is_err());
        assert!(order.pay(TransactionId::new(), PaymentMethod::Card).is_err());
        assert_eq!(order.transaction_id(), None);
    }

    #[test]
    fn test_cancel_only_from_pending_payment() {
        let mut order = pending_order();
        order.cancel().unwrap();
        assert_eq!(order.status(), OrderStatus::Canceled);
        assert!(order.is_terminal());

        let mut paid = pending_order();
        paid.pay(TransactionId::new(), PaymentMethod::Card).unwrap();
        let err = paid.cancel().unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidStateTransition {
                current: OrderStatus::Paid,
                action: "cancel",
            }
        );
        assert_eq!(paid.status(), OrderStatus::Paid);
    }

    #[test]
    fn test_paid_order_keeps_transaction_invariant() {
        let mut order = pending_order();
        assert!(!order.status().requires_transaction());
        order.pay(TransactionId::new(), PaymentMethod::Card).unwrap();
        assert!(order.status().requires_transaction());
        assert!(order.transaction_id().is_some());
    }

    #[test]
    fn test_overwrite_status_ignores_guards() {
        let mut order = pending_order();
        order.cancel().unwrap();

        let previous = order.overwrite_status(OrderStatus::Assembled);

        assert_eq!(previous, OrderStatus::Canceled);
        assert_eq!(order.status(), OrderStatus::Assembled);
    }
}
