//! Order lifecycle.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::OrderError;

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// PendingPayment ──pay──► Paid ──assembled──► Assembled
///       │
///       └──cancel──► Canceled
/// ```
///
/// The assembled transition is driven by an event and overwrites whatever
/// status the order had, so an order in any status can end up `Assembled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created and priced, awaiting payment.
    #[default]
    PendingPayment,

    /// Charged; waiting for assembly.
    Paid,

    /// Canceled before payment (terminal state).
    Canceled,

    /// Built and shipped (terminal state).
    Assembled,
}

impl OrderStatus {
    /// Returns true if the order can be paid in this status.
    pub fn can_pay(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment)
    }

    /// Returns true if the order can be canceled in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Canceled | OrderStatus::Assembled)
    }

    /// Returns true if an order in this status must carry a transaction id.
    pub fn requires_transaction(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Assembled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Assembled => "assembled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(OrderStatus::PendingPayment),
            "paid" => Ok(OrderStatus::Paid),
            "canceled" => Ok(OrderStatus::Canceled),
            "assembled" => Ok(OrderStatus::Assembled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}
