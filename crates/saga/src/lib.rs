//! Order fulfillment saga.
//!
//! The saga is partly orchestrated and partly choreographed:
//!
//! 1. [`OrderOrchestrator::create_order`] prices parts through the inventory
//!    and persists a `pending_payment` order.
//! 2. [`OrderOrchestrator::pay_order`] charges through the payment processor,
//!    marks the order `paid` and publishes `OrderPaid` to `order.paid`.
//! 3. The [`AssemblyService`] consumes `order.paid`, builds the ship and
//!    publishes `ShipAssembled` to `order.assembled`.
//! 4. The [`ShipAssembledHandler`] consumes `order.assembled` and moves the
//!    order to `assembled`.
//!
//! The [`NotificationService`] listens to both topics under its own group.
//! No step is compensated when a later one fails.

pub mod consumers;
pub mod error;
pub mod orchestrator;
pub mod publisher;
pub mod services;

pub use consumers::{
    AssemblyService, InMemoryNotifier, NotificationService, Notifier, ShipAssembledHandler,
    TracingNotifier,
};
pub use error::{Result, SagaError};
pub use orchestrator::{OrchestratorConfig, OrderOrchestrator};
pub use publisher::EventPublisher;
pub use services::{
    InMemoryPartLookup, InMemoryPaymentProcessor, Part, PartCategory, PartLookup, PartsFilter,
    PaymentProcessor, PaymentRequest,
};
