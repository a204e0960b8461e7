//! Events exchanged between the order, assembly and notification services.
//!
//! Events are published keyed by order id and encoded as a protobuf envelope
//! whose `oneof` field tells the kinds apart. Decoding is strict: a payload
//! that is not a well-formed envelope with a known event kind is an error.

mod wire;

use common::{EventId, OrderId, TransactionId, UserId};
use prost::Message as _;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::order::PaymentMethod;

/// Emitted once per successful payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub event_id: EventId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub payment_method: PaymentMethod,
    pub transaction_id: TransactionId,
}

/// Emitted by the assembly service once an order has been built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipAssembledEvent {
    pub event_id: EventId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub build_time_seconds: i64,
}

/// Any event carried on the saga topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    OrderPaid(OrderPaidEvent),
    ShipAssembled(ShipAssembledEvent),
}

impl DomainEvent {
    /// The order the event belongs to, also used as the partition key.
    pub fn order_id(&self) -> OrderId {
        match self {
            DomainEvent::OrderPaid(e) => e.order_id,
            DomainEvent::ShipAssembled(e) => e.order_id,
        }
    }

    pub fn event_id(&self) -> EventId {
        match self {
            DomainEvent::OrderPaid(e) => e.event_id,
            DomainEvent::ShipAssembled(e) => e.event_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::OrderPaid(_) => "OrderPaid",
            DomainEvent::ShipAssembled(_) => "ShipAssembled",
        }
    }

    /// Partition key bytes: the hyphenated order id.
    pub fn key(&self) -> Vec<u8> {
        self.order_id().to_string().into_bytes()
    }

    /// Encodes the event into its wire envelope.
    pub fn encode(&self) -> Vec<u8> {
        let payload = match self {
            DomainEvent::OrderPaid(e) => wire::Payload::OrderPaid(wire::OrderPaid {
                event_uuid: e.event_id.to_string(),
                order_uuid: e.order_id.to_string(),
                user_uuid: e.user_id.to_string(),
                payment_method: e.payment_method.as_i32(),
                transaction_uuid: e.transaction_id.to_string(),
            }),
            DomainEvent::ShipAssembled(e) => wire::Payload::ShipAssembled(wire::ShipAssembled {
                event_uuid: e.event_id.to_string(),
                order_uuid: e.order_id.to_string(),
                user_uuid: e.user_id.to_string(),
                build_time_sec: e.build_time_seconds,
            }),
        };
        wire::EventEnvelope {
            payload: Some(payload),
        }
        .encode_to_vec()
    }

    /// Decodes a wire envelope.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let envelope = wire::EventEnvelope::decode(bytes)?;
        match envelope.payload.ok_or(DecodeError::MissingPayload)? {
            wire::Payload::OrderPaid(p) => Ok(DomainEvent::OrderPaid(OrderPaidEvent {
                event_id: parse_id("event_uuid", &p.event_uuid)?,
                order_id: parse_id("order_uuid", &p.order_uuid)?,
                user_id: parse_id("user_uuid", &p.user_uuid)?,
                payment_method: PaymentMethod::from_i32(p.payment_method),
                transaction_id: parse_id("transaction_uuid", &p.transaction_uuid)?,
            })),
            wire::Payload::ShipAssembled(p) => {
                if p.build_time_sec < 0 {
                    return Err(DecodeError::InvalidValue {
                        field: "build_time_sec",
                        value: p.build_time_sec,
                    });
                }
                Ok(DomainEvent::ShipAssembled(ShipAssembledEvent {
                    event_id: parse_id("event_uuid", &p.event_uuid)?,
                    order_id: parse_id("order_uuid", &p.order_uuid)?,
                    user_id: parse_id("user_uuid", &p.user_uuid)?,
                    build_time_seconds: p.build_time_sec,
                }))
            }
        }
    }
}

impl From<OrderPaidEvent> for DomainEvent {
    fn from(event: OrderPaidEvent) -> Self {
        DomainEvent::OrderPaid(event)
    }
}

impl From<ShipAssembledEvent> for DomainEvent {
    fn from(event: ShipAssembledEvent) -> Self {
        DomainEvent::ShipAssembled(event)
    }
}

fn parse_id<T: From<uuid::Uuid>>(field: &'static str, value: &str) -> Result<T, DecodeError> {
    uuid::Uuid::parse_str(value)
        .map(T::from)
        .map_err(|source| DecodeError::InvalidId { field, source })
}
