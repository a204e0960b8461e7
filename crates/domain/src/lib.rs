//! Domain layer for order fulfillment.
//!
//! This crate provides:
//! - The [`Order`] aggregate and its [`OrderStatus`] lifecycle
//! - Saga events ([`OrderPaidEvent`], [`ShipAssembledEvent`]) and their binary codec
//! - The [`OrderStore`] persistence seam with in-memory and PostgreSQL backends

pub mod error;
pub mod events;
pub mod order;
pub mod store;

pub use common::{EventId, OrderId, PartId, TransactionId, UserId};
pub use error::{DecodeError, StoreError};
pub use events::{DomainEvent, OrderPaidEvent, ShipAssembledEvent};
pub use order::{Money, Order, OrderError, OrderStatus, PaymentMethod};
pub use store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
