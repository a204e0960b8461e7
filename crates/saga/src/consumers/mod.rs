//! Event-driven participants of the saga.
//!
//! Each consumer runs under its own consumer group, so every one of them
//! receives its own copy of each event. A handler error leaves the offset
//! unmarked and is only visible in the logs.

mod assembly;
mod notification;
mod ship_assembled;

pub use assembly::AssemblyService;
pub use notification::{InMemoryNotifier, NotificationService, Notifier, TracingNotifier};
pub use ship_assembled::ShipAssembledHandler;
