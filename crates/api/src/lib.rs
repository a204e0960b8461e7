//! HTTP API and process assembly for the order service.
//!
//! Exposes the order endpoints over axum, with structured logging (tracing)
//! and Prometheus metrics. The `api` binary also hosts the order service's
//! `order.assembled` consumer; the `assembly` and `notification` binaries run
//! the other saga participants against Kafka.

pub mod catalog;
pub mod config;
pub mod error;
pub mod messaging;
pub mod routes;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::OrderStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    EventPublisher, InMemoryPartLookup, InMemoryPaymentProcessor, OrchestratorConfig,
    OrderOrchestrator,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::{AppState, Orchestrator};
use routes::system::Backends;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + 'static>(
    state: Arc<AppState<S>>,
    backends: Backends,
    metrics_handle: PrometheusHandle,
) -> Router {
    let system_router = Router::new()
        .route("/health", get(routes::system::health))
        .with_state(backends)
        .merge(
            Router::new()
                .route("/metrics", get(routes::system::metrics))
                .with_state(metrics_handle),
        );

    let orders_router = Router::new()
        .route("/", post(routes::orders::create::<S>))
        .route("/{id}", get(routes::orders::get::<S>))
        .route("/{id}/pay", post(routes::orders::pay::<S>))
        .route("/{id}/cancel", post(routes::orders::cancel::<S>))
        .with_state(state);

    Router::new()
        .nest("/api/v1/orders", orders_router)
        .merge(system_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around an orchestrator built from the
/// given store and collaborators.
pub fn create_state<S: OrderStore + 'static>(
    store: S,
    inventory: InMemoryPartLookup,
    payment: InMemoryPaymentProcessor,
    publisher: EventPublisher,
    config: OrchestratorConfig,
) -> Arc<AppState<S>> {
    let orchestrator: Orchestrator<S> =
        OrderOrchestrator::with_config(store, inventory, payment, publisher, config);
    Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
    })
}
