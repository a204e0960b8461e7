//! Order aggregate and related types.

mod aggregate;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use state::OrderStatus;
pub use value_objects::{Money, PaymentMethod};

use thiserror::Error;

/// Errors raised by the order aggregate's guards and parsers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The order is not in a status that allows the action.
    #[error("Invalid state transition: cannot {action} from {current} status")]
    InvalidStateTransition {
        current: OrderStatus,
        action: &'static str,
    },

    /// An order needs at least one part.
    #[error("Order has no parts")]
    NoParts,

    /// Part prices summed to a negative total.
    #[error("Invalid total price: {0} (must not be negative)")]
    NegativeTotal(Money),

    /// Part prices summed past the largest representable amount.
    #[error("Order total overflows")]
    TotalOverflow,

    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    #[error("Unknown payment method: {0}")]
    UnknownPaymentMethod(String),
}
