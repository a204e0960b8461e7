use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use tokio::sync::RwLock;

use super::OrderStore;
use crate::error::{Result, StoreError};
use crate::order::Order;

#[derive(Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    unavailable: bool,
}

/// In-memory order store for tests and single-process runs.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Makes every subsequent call fail as if the database were down.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }
}

fn check_available(state: &State) -> Result<()> {
    if state.unavailable {
        return Err(StoreError::Unavailable(
            "in-memory store is marked unavailable".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<OrderId> {
        let mut state = self.state.write().await;
        check_available(&state)?;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::AlreadyExists(order.id));
        }
        state.orders.insert(order.id, order.clone());
        Ok(order.id)
    }

    async fn get(&self, id: OrderId) -> Result<Order> {
        let state = self.state.read().await;
        check_available(&state)?;
        state
            .orders
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, order: &mut Order) -> Result<()> {
        let mut state = self.state.write().await;
        check_available(&state)?;
        let stored = state
            .orders
            .get_mut(&order.id)
            .ok_or(StoreError::NotFound(order.id))?;

        if stored.version != order.version {
            return Err(StoreError::VersionConflict {
                order_id: order.id,
                expected: order.version,
                actual: stored.version,
            });
        }

        order.version += 1;
        *stored = order.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Money, OrderStatus, PaymentMethod};
    use common::{PartId, TransactionId, UserId};

    fn new_order() -> Order {
        Order::new(UserId::new(), vec![PartId::new()], Money::from_dollars(10)).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryOrderStore::new();
        let order = new_order();

        let id = store.create(&order).await.unwrap();
        assert_eq!(id, order.id());
        assert_eq!(store.get(id).await.unwrap(), order);
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = InMemoryOrderStore::new();
        let order = new_order();
        store.create(&order).await.unwrap();

        assert!(matches!(
            store.create(&order).await,
            Err(StoreError::AlreadyExists(id)) if id == order.id()
        ));
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let store = InMemoryOrderStore::new();
        let id = OrderId::new();
        assert!(matches!(store.get(id).await, Err(StoreError::NotFound(got)) if got == id));
    }

    #[tokio::test]
    async fn test_update_advances_version() {
        let store = InMemoryOrderStore::new();
        let order = new_order();
        store.create(&order).await.unwrap();

        let mut loaded = store.get(order.id()).await.unwrap();
        loaded
            .pay(TransactionId::new(), PaymentMethod::Card)
            .unwrap();
        store.update(&mut loaded).await.unwrap();

        assert_eq!(loaded.version(), 1);
        let reloaded = store.get(order.id()).await.unwrap();
        assert_eq!(reloaded.status(), OrderStatus::Paid);
        assert_eq!(reloaded.version(), 1);
    }

    #[tokio::test]
    async fn test_stale_update_is_a_version_conflict() {
        let store = InMemoryOrderStore::new();
        let order = new_order();
        store.create(&order).await.unwrap();

        let mut payer = store.get(order.id()).await.unwrap();
        let mut canceler = store.get(order.id()).await.unwrap();

        payer.pay(TransactionId::new(), PaymentMethod::Card).unwrap();
        store.update(&mut payer).await.unwrap();

        canceler.cancel().unwrap();
        let err = store.update(&mut canceler).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict { expected: 0, actual: 1, .. }
        ));
        assert_eq!(store.get(order.id()).await.unwrap().status(), OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let store = InMemoryOrderStore::new();
        let mut order = new_order();
        assert!(matches!(
            store.update(&mut order).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = InMemoryOrderStore::new();
        store.set_unavailable(true).await;
        assert!(matches!(
            store.create(&new_order()).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
