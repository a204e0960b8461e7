//! Value objects for the order domain.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::OrderError;

/// Money amount represented in cents to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a dollar value.
    pub fn from_dollars(dollars: i64) -> Self {
        Self {
            cents: dollars * 100,
        }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns the amount as a decimal number of dollars.
    pub fn as_f64(&self) -> f64 {
        self.cents as f64 / 100.0
    }

    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Adds two amounts, or returns `None` if the sum does not fit.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.cents.checked_add(rhs.cents).map(Money::from_cents)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

/// How an order was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Not paid yet, or paid through an unrecognised channel.
    #[default]
    Unknown,
    Card,
    /// Instant bank transfer (fast payment system).
    InstantTransfer,
    CreditCard,
    InvestorMoney,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Unknown => "unknown",
            PaymentMethod::Card => "card",
            PaymentMethod::InstantTransfer => "instant_transfer",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::InvestorMoney => "investor_money",
        }
    }

    /// Wire discriminant used in event payloads.
    pub fn as_i32(&self) -> i32 {
        match self {
            PaymentMethod::Unknown => 0,
            PaymentMethod::Card => 1,
            PaymentMethod::InstantTransfer => 2,
            PaymentMethod::CreditCard => 3,
            PaymentMethod::InvestorMoney => 4,
        }
    }

    /// Maps a wire discriminant back; unrecognised values become `Unknown`.
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => PaymentMethod::Card,
            2 => PaymentMethod::InstantTransfer,
            3 => PaymentMethod::CreditCard,
            4 => PaymentMethod::InvestorMoney,
            _ => PaymentMethod::Unknown,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = OrderError;

    /// Accepts the snake_case names as well as the upper-case names used by
    /// the payment gateway (`CARD`, `SBP`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unknown" => Ok(PaymentMethod::Unknown),
            "card" => Ok(PaymentMethod::Card),
            "instant_transfer" | "sbp" => Ok(PaymentMethod::InstantTransfer),
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "investor_money" => Ok(PaymentMethod::InvestorMoney),
            _ => Err(OrderError::UnknownPaymentMethod(s.to_string())),
        }
    }
}
