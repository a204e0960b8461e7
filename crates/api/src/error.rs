//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::StoreError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request from the client.
    BadRequest(String),
    /// Saga operation error.
    Saga(SagaError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Saga(err) => saga_error_status(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Saga(err) => {
                if status.is_server_error() {
                    tracing::error!(error = %err, %status, "request failed");
                }
                err.to_string()
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::OrderNotFound(_) | SagaError::PartNotFound(_) => StatusCode::NOT_FOUND,
        SagaError::InvalidState(_) => StatusCode::CONFLICT,
        SagaError::Store(StoreError::VersionConflict { .. }) => StatusCode::CONFLICT,
        SagaError::Validation(_) => StatusCode::BAD_REQUEST,
        e if e.is_upstream() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderId, PartId};
    use domain::{OrderError, OrderStatus};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (SagaError::OrderNotFound(OrderId::new()), StatusCode::NOT_FOUND),
            (SagaError::PartNotFound(PartId::new()), StatusCode::NOT_FOUND),
            (
                SagaError::InvalidState(OrderError::InvalidStateTransition {
                    current: OrderStatus::Paid,
                    action: "pay",
                }),
                StatusCode::CONFLICT,
            ),
            (
                SagaError::Store(StoreError::VersionConflict {
                    order_id: OrderId::new(),
                    expected: 0,
                    actual: 1,
                }),
                StatusCode::CONFLICT,
            ),
            (SagaError::Validation(OrderError::NoParts), StatusCode::BAD_REQUEST),
            (SagaError::Payment("declined".into()), StatusCode::BAD_GATEWAY),
            (
                SagaError::Store(StoreError::Unavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }
}
