//! Synchronous collaborator traits and in-memory implementations.

pub mod inventory;
pub mod payment;

pub use inventory::{InMemoryPartLookup, Part, PartCategory, PartLookup, PartsFilter};
pub use payment::{InMemoryPaymentProcessor, PaymentProcessor, PaymentRequest};
