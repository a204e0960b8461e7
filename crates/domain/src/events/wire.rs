//! Protobuf wire messages for saga events.
//!
//! Field numbers are part of the topic contract and must not be reused.

/// Envelope carried as the value of every event record.
#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct EventEnvelope {
    #[prost(oneof = "Payload", tags = "1, 2")]
    pub payload: Option<Payload>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub(crate) enum Payload {
    #[prost(message, tag = "1")]
    OrderPaid(OrderPaid),
    #[prost(message, tag = "2")]
    ShipAssembled(ShipAssembled),
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct OrderPaid {
    #[prost(string, tag = "1")]
    pub event_uuid: String,
    #[prost(string, tag = "2")]
    pub order_uuid: String,
    #[prost(string, tag = "3")]
    pub user_uuid: String,
    #[prost(int32, tag = "4")]
    pub payment_method: i32,
    #[prost(string, tag = "5")]
    pub transaction_uuid: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct ShipAssembled {
    #[prost(string, tag = "1")]
    pub event_uuid: String,
    #[prost(string, tag = "2")]
    pub order_uuid: String,
    #[prost(string, tag = "3")]
    pub user_uuid: String,
    #[prost(int64, tag = "4")]
    pub build_time_sec: i64,
}
