//! Notification service: tells users about paid and assembled orders.

use std::sync::Arc;

use api::config::Config;
use api::messaging::{self, Broker};
use closer::Closer;
use saga::{NotificationService, TracingNotifier};

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("invalid configuration");
    api::telemetry::init_tracing(&config.log_level);

    let Some(brokers) = config.kafka_brokers.as_deref() else {
        tracing::error!("KAFKA_BROKERS must be set to run the notification service");
        std::process::exit(1);
    };
    let broker = Broker::from_brokers(Some(brokers));
    let closer = Closer::new();

    messaging::spawn_notification_consumers(
        &config,
        &broker,
        &closer,
        Arc::new(NotificationService::new(TracingNotifier)),
    )
    .expect("failed to create notification consumers");
    tracing::info!("notification service running");

    closer::shutdown_signal().await;
    if let Err(e) = closer.close_all(config.shutdown_timeout).await {
        tracing::error!(error = %e, "shutdown finished with errors");
    }
}
