//! Assembly service: builds paid orders and reports them assembled.

use std::sync::Arc;

use api::config::Config;
use api::messaging::{self, Broker};
use closer::Closer;
use saga::{AssemblyService, EventPublisher};

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("invalid configuration");
    api::telemetry::init_tracing(&config.log_level);

    let Some(brokers) = config.kafka_brokers.as_deref() else {
        tracing::error!("KAFKA_BROKERS must be set to run the assembly service");
        std::process::exit(1);
    };
    let broker = Broker::from_brokers(Some(brokers));
    let closer = Closer::new();

    let publisher = EventPublisher::new(
        broker
            .producer(&config.order_assembled_topic)
            .expect("failed to create order.assembled producer"),
    );
    let consumer = broker
        .consumer(&config.assembly_group_id, &[config.order_paid_topic.as_str()])
        .expect("failed to create order.paid consumer");
    messaging::spawn_consumer(
        &closer,
        "assembly-consumer",
        consumer,
        Arc::new(AssemblyService::new(publisher, config.assembly_build_time)),
    );
    tracing::info!(
        group_id = %config.assembly_group_id,
        build_time_secs = config.assembly_build_time.as_secs(),
        "assembly service running"
    );

    closer::shutdown_signal().await;
    if let Err(e) = closer.close_all(config.shutdown_timeout).await {
        tracing::error!(error = %e, "shutdown finished with errors");
    }
}
