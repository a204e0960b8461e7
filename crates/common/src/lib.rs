//! Identifier types shared by every order fulfillment crate.

mod types;

pub use types::{EventId, OrderId, PartId, TransactionId, UserId};
