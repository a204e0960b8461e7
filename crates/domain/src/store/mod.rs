//! Order persistence.

mod memory;
mod postgres;

pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;

use async_trait::async_trait;
use common::OrderId;

use crate::error::Result;
use crate::order::Order;

/// Persistence seam for orders.
///
/// Implementations must be safe for concurrent use from every orchestrator
/// call site.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order and returns its id.
    async fn create(&self, order: &Order) -> Result<OrderId>;

    /// Loads an order, failing with `NotFound` for unknown ids.
    async fn get(&self, id: OrderId) -> Result<Order>;

    /// Writes back an order loaded earlier.
    ///
    /// The write only succeeds if the stored version still equals
    /// `order.version()`; otherwise it fails with `VersionConflict` and nothing
    /// is written. On success the order's version is advanced to the stored one.
    async fn update(&self, order: &mut Order) -> Result<()>;
}
