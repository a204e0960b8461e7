//! Order service entry point.

use std::sync::Arc;

use api::config::Config;
use api::messaging::{self, Broker};
use api::routes::system::Backends;
use closer::{BoxError, Closer};
use domain::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    AssemblyService, EventPublisher, InMemoryPaymentProcessor, NotificationService,
    ShipAssembledHandler, TracingNotifier,
};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("invalid configuration");

    // 1. Initialize tracing and the Prometheus recorder
    api::telemetry::init_tracing(&config.log_level);
    let metrics_handle =
        api::telemetry::install_metrics().expect("failed to install Prometheus recorder");

    // 2. Every started resource registers its teardown here
    let closer = Arc::new(Closer::new());

    // 3. Pick the order store
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresOrderStore::new(pool.clone());
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            closer.add_named("postgres-pool", move || async move {
                pool.close().await;
                Ok::<(), BoxError>(())
            });
            run(config, store, "postgres", closer, metrics_handle).await;
        }
        None => {
            run(config, InMemoryOrderStore::new(), "memory", closer, metrics_handle).await;
        }
    }
}

async fn run<S: OrderStore + 'static>(
    config: Config,
    store: S,
    store_kind: &'static str,
    closer: Arc<Closer>,
    metrics_handle: PrometheusHandle,
) {
    // 4. Connect to the broker
    let broker = Broker::from_brokers(config.kafka_brokers.as_deref());
    let paid_publisher = EventPublisher::new(
        broker
            .producer(&config.order_paid_topic)
            .expect("failed to create order.paid producer"),
    );

    // 5. Build the orchestrator over the demo catalog
    let state = api::create_state(
        store,
        api::catalog::demo_catalog(),
        InMemoryPaymentProcessor::new(),
        paid_publisher,
        config.orchestrator(),
    );

    // 6. Start consumers
    let assembled_consumer = broker
        .consumer(
            &config.order_assembled_group_id,
            &[config.order_assembled_topic.as_str()],
        )
        .expect("failed to create order.assembled consumer");
    messaging::spawn_consumer(
        &closer,
        "order-assembled-consumer",
        assembled_consumer,
        Arc::new(ShipAssembledHandler::new(state.orchestrator.clone())),
    );

    if broker.is_in_process() {
        start_in_process_participants(&config, &broker, &closer);
    }

    // 7. Serve HTTP until a shutdown signal arrives
    let backends = Backends {
        store: store_kind,
        broker: broker.kind(),
    };
    let app = api::create_app(state, backends, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, store = store_kind, broker = broker.kind(), "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(closer::shutdown_signal())
        .await
        .expect("server error");

    // 8. Tear everything down in reverse order of registration
    match closer.close_all(config.shutdown_timeout).await {
        Ok(()) => tracing::info!("server shut down gracefully"),
        Err(e) => tracing::error!(error = %e, "shutdown finished with errors"),
    }
}

/// Runs the assembly and notification services inside this process, so the
/// whole saga works without Kafka.
fn start_in_process_participants(config: &Config, broker: &Broker, closer: &Closer) {
    let assembly = AssemblyService::new(
        EventPublisher::new(
            broker
                .producer(&config.order_assembled_topic)
                .expect("failed to create order.assembled producer"),
        ),
        config.assembly_build_time,
    );
    messaging::spawn_consumer(
        closer,
        "assembly-consumer",
        broker
            .consumer(&config.assembly_group_id, &[config.order_paid_topic.as_str()])
            .expect("failed to create assembly consumer"),
        Arc::new(assembly),
    );

    let notifications = Arc::new(NotificationService::new(TracingNotifier));
    messaging::spawn_notification_consumers(config, broker, closer, notifications)
        .expect("failed to create notification consumers");
}
