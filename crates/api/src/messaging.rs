//! Broker selection and consumer lifecycle for the service binaries.

use std::sync::Arc;

use closer::{BoxError, Closer};
use tokio_util::sync::CancellationToken;
use transport::{
    Consumer, InMemoryBroker, KafkaConsumer, KafkaConsumerConfig, KafkaProducer,
    KafkaProducerConfig, LoggingMiddleware, MessageHandler, Producer, TransportError,
};

use crate::config::Config;

/// The broker a process publishes to and consumes from.
#[derive(Clone)]
pub enum Broker {
    Kafka { brokers: Vec<String> },
    InProcess(InMemoryBroker),
}

impl Broker {
    /// Kafka when brokers are configured, an in-process broker otherwise.
    pub fn from_brokers(brokers: Option<&[String]>) -> Self {
        match brokers {
            Some(brokers) => Broker::Kafka {
                brokers: brokers.to_vec(),
            },
            None => Broker::InProcess(InMemoryBroker::new()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Broker::Kafka { .. } => "kafka",
            Broker::InProcess(_) => "memory",
        }
    }

    pub fn is_in_process(&self) -> bool {
        matches!(self, Broker::InProcess(_))
    }

    pub fn producer(&self, topic: &str) -> Result<Arc<dyn Producer>, TransportError> {
        let producer: Arc<dyn Producer> = match self {
            Broker::Kafka { brokers } => {
                let config = KafkaProducerConfig::new(brokers.clone(), topic);
                Arc::new(KafkaProducer::new(&config)?)
            }
            Broker::InProcess(broker) => Arc::new(broker.producer(topic)),
        };
        Ok(producer)
    }

    /// A consumer joining `group_id`, with every received message logged.
    pub fn consumer(
        &self,
        group_id: &str,
        topics: &[&str],
    ) -> Result<Arc<dyn Consumer>, TransportError> {
        let logging = Arc::new(LoggingMiddleware);
        let consumer: Arc<dyn Consumer> = match self {
            Broker::Kafka { brokers } => {
                let config = KafkaConsumerConfig::new(
                    brokers.clone(),
                    group_id,
                    topics.iter().map(|t| t.to_string()).collect(),
                );
                Arc::new(KafkaConsumer::new(&config)?.with_middleware(logging))
            }
            Broker::InProcess(broker) => Arc::new(
                broker
                    .consumer(group_id, topics.iter().copied())
                    .with_middleware(logging),
            ),
        };
        Ok(consumer)
    }
}

/// Runs `consumer` in the background until the closer tears it down.
///
/// The teardown cancels consumption and waits for the consume loop to
/// return, so in-flight handlers are dropped and their offsets stay unmarked.
pub fn spawn_consumer(
    closer: &Closer,
    name: &str,
    consumer: Arc<dyn Consumer>,
    handler: Arc<dyn MessageHandler>,
) {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let consumer_name = name.to_string();
    let task = tokio::spawn(async move {
        let result = consumer.consume(handler, token).await;
        if let Err(e) = &result {
            tracing::error!(consumer = %consumer_name, error = %e, "consumer stopped with error");
        }
        result
    });
    tracing::info!(consumer = name, "consumer started");

    closer.add_named(name, move || async move {
        shutdown.cancel();
        task.await??;
        Ok::<(), BoxError>(())
    });
}

/// Starts the notification service's consumers, one group per topic, both
/// feeding `handler`.
pub fn spawn_notification_consumers(
    config: &Config,
    broker: &Broker,
    closer: &Closer,
    handler: Arc<dyn MessageHandler>,
) -> Result<(), TransportError> {
    let subscriptions = [
        (
            "notification-order-paid-consumer",
            &config.notification_paid_group_id,
            &config.order_paid_topic,
        ),
        (
            "notification-order-assembled-consumer",
            &config.notification_assembled_group_id,
            &config.order_assembled_topic,
        ),
    ];
    for (name, group_id, topic) in subscriptions {
        let consumer = broker.consumer(group_id, &[topic.as_str()])?;
        spawn_consumer(closer, name, consumer, handler.clone());
        tracing::info!(consumer = name, %group_id, %topic, "notification consumer joined");
    }
    Ok(())
}
