//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, PartId, UserId};
use domain::{Order, OrderStore, PaymentMethod};
use saga::{InMemoryPartLookup, InMemoryPaymentProcessor, OrderOrchestrator};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Orchestrator wired to the process's collaborators.
pub type Orchestrator<S> = OrderOrchestrator<S, InMemoryPartLookup, InMemoryPaymentProcessor>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore> {
    pub orchestrator: Arc<Orchestrator<S>>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub part_ids: Vec<String>,
}

#[derive(Deserialize)]
pub struct PayOrderRequest {
    pub payment_method: String,
    pub user_id: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: OrderId,
    pub total_price: f64,
}

#[derive(Serialize)]
pub struct OrderPaidResponse {
    pub transaction_id: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub part_ids: Vec<PartId>,
    pub total_price: f64,
    pub transaction_id: Option<String>,
    pub payment_method: PaymentMethod,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id(),
            user_id: order.user_id(),
            part_ids: order.part_ids().to_vec(),
            total_price: order.total_price().as_f64(),
            transaction_id: order.transaction_id().map(|t| t.to_string()),
            payment_method: order.payment_method(),
            status: order.status().to_string(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

// -- Handlers --

/// POST /api/v1/orders: price the parts and create a pending order.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let user_id = parse_id::<UserId>("user_id", &req.user_id)?;
    let part_ids = req
        .part_ids
        .iter()
        .map(|id| parse_id::<PartId>("part_id", id))
        .collect::<Result<Vec<_>, _>>()?;

    let order = state.orchestrator.create_order(user_id, part_ids).await?;

    let response = OrderCreatedResponse {
        order_id: order.id(),
        total_price: order.total_price().as_f64(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id::<OrderId>("order_id", &id)?;
    let order = state.orchestrator.get_order(order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /api/v1/orders/{id}/pay
#[tracing::instrument(skip(state, req))]
pub async fn pay<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<PayOrderRequest>,
) -> Result<Json<OrderPaidResponse>, ApiError> {
    let order_id = parse_id::<OrderId>("order_id", &id)?;
    let user_id = req
        .user_id
        .as_deref()
        .map(|u| parse_id::<UserId>("user_id", u))
        .transpose()?;
    let payment_method: PaymentMethod = req
        .payment_method
        .parse()
        .map_err(|e: domain::OrderError| ApiError::BadRequest(e.to_string()))?;
    if payment_method == PaymentMethod::Unknown {
        return Err(ApiError::BadRequest(
            "payment_method must name a payment method".to_string(),
        ));
    }

    let order = state
        .orchestrator
        .pay_order(order_id, user_id, payment_method)
        .await?;

    let transaction_id = order
        .transaction_id()
        .map(|t| t.to_string())
        .unwrap_or_default();
    Ok(Json(OrderPaidResponse { transaction_id }))
}

/// POST /api/v1/orders/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let order_id = parse_id::<OrderId>("order_id", &id)?;
    state.orchestrator.cancel_order(order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_id<T>(field: &str, value: &str) -> Result<T, ApiError>
where
    T: std::str::FromStr<Err = uuid::Error>,
{
    value
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
