//! Kafka-backed producer and consumer built on rdkafka.
//!
//! The consumer stores a message's offset only after the handler chain
//! succeeds (`enable.auto.offset.store=false`) and lets the client's
//! auto-commit flush the highest stored offset per partition. Each assigned
//! partition gets its own worker task, so partitions are handled in parallel
//! while records within a partition are handled strictly in order. A revoked
//! partition's worker is stopped before the next record is dispatched, and its
//! buffered records are dropped for the new owner to re-read.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{
    BaseConsumer, Consumer as _, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Headers, Message as _};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::util::Timeout;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::{Consumer, Producer};
use crate::handler::{MessageHandler, Middleware, chain, dispatch};
use crate::{Message, Result, TransportError};

/// Buffered records per partition worker before the poll loop waits.
const PARTITION_BUFFER: usize = 256;

/// Settings for a [`KafkaProducer`].
#[derive(Debug, Clone)]
pub struct KafkaProducerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    /// How long the client may spend delivering one record, retries included.
    pub message_timeout: Duration,
    /// Bounded retry count applied by the client itself.
    pub retries: u32,
}

impl KafkaProducerConfig {
    /// Config with the defaults used by the order services.
    pub fn new(brokers: Vec<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers,
            topic: topic.into(),
            message_timeout: Duration::from_secs(5),
            retries: 3,
        }
    }

    fn client_config(&self) -> Result<ClientConfig> {
        if self.brokers.is_empty() {
            return Err(TransportError::Config("no brokers configured".to_string()));
        }
        if self.topic.is_empty() {
            return Err(TransportError::Config("producer topic is empty".to_string()));
        }

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.brokers.join(","))
            .set("acks", "all")
            .set(
                "message.timeout.ms",
                self.message_timeout.as_millis().to_string(),
            )
            .set("retries", self.retries.to_string())
            .set("partitioner", "murmur2_random");
        Ok(config)
    }
}

/// Settings for a [`KafkaConsumer`].
#[derive(Debug, Clone)]
pub struct KafkaConsumerConfig {
    pub brokers: Vec<String>,
    pub group_id: String,
    pub topics: Vec<String>,
    /// Where a group with no committed offset starts (`earliest` or `latest`).
    pub offset_reset: String,
}

impl KafkaConsumerConfig {
    /// Config with the defaults used by the order services.
    pub fn new(brokers: Vec<String>, group_id: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            brokers,
            group_id: group_id.into(),
            topics,
            offset_reset: "earliest".to_string(),
        }
    }

    fn client_config(&self) -> Result<ClientConfig> {
        if self.brokers.is_empty() {
            return Err(TransportError::Config("no brokers configured".to_string()));
        }
        if self.group_id.is_empty() {
            return Err(TransportError::Config("consumer group id is empty".to_string()));
        }
        if self.topics.is_empty() {
            return Err(TransportError::Config("no topics to consume".to_string()));
        }

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.brokers.join(","))
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", &self.offset_reset)
            .set("partition.assignment.strategy", "roundrobin");
        Ok(config)
    }
}

/// Synchronous producer: `send` resolves once all in-sync replicas acknowledged.
pub struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
}

impl KafkaProducer {
    /// Creates a producer. No connection is made until the first send.
    pub fn new(config: &KafkaProducerConfig) -> Result<Self> {
        let producer: FutureProducer = config.client_config()?.create()?;
        Ok(Self {
            producer,
            topic: config.topic.clone(),
            send_timeout: config.message_timeout,
        })
    }

    /// Topic this producer publishes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn send(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let record = FutureRecord::to(&self.topic).key(key).payload(value);

        match self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
        {
            Ok(_) => {
                metrics::counter!("transport_messages_sent_total").increment(1);
                tracing::debug!(topic = %self.topic, "message published");
                Ok(())
            }
            Err((e, _)) => {
                tracing::error!(error = %e, topic = %self.topic, "failed to publish message");
                Err(TransportError::Kafka(e))
            }
        }
    }
}

/// A topic partition, as tracked by the poll loop.
type PartitionKey = (String, i32);

/// Client context logging group rebalances and offset commits.
///
/// Revoked partitions are forwarded to the poll loop so their workers stop
/// before another member starts reading them.
pub struct GroupContext {
    group_id: String,
    revoked: mpsc::UnboundedSender<Vec<PartitionKey>>,
}

impl ClientContext for GroupContext {}

impl ConsumerContext for GroupContext {
    fn pre_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(tpl) => tracing::info!(
                group_id = %self.group_id,
                partitions = tpl.count(),
                "consumer group rebalancing: partitions assigned"
            ),
            Rebalance::Revoke(tpl) => {
                tracing::info!(
                    group_id = %self.group_id,
                    partitions = tpl.count(),
                    "consumer group rebalancing: partitions revoked"
                );
                let revoked = tpl
                    .elements()
                    .iter()
                    .map(|e| (e.topic().to_string(), e.partition()))
                    .collect();
                // Closed only once the consumer itself is gone.
                let _ = self.revoked.send(revoked);
            }
            Rebalance::Error(e) => tracing::warn!(
                group_id = %self.group_id,
                error = %e,
                "consumer group rebalance failed"
            ),
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, _offsets: &TopicPartitionList) {
        if let Err(e) = result {
            tracing::warn!(group_id = %self.group_id, error = %e, "offset commit failed");
        }
    }
}

/// Consumer-group member backed by an rdkafka [`StreamConsumer`].
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer<GroupContext>>,
    revoked: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<PartitionKey>>>,
    group_id: String,
    topics: Vec<String>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl KafkaConsumer {
    /// Creates a consumer. The group is joined when [`Consumer::consume`] runs.
    pub fn new(config: &KafkaConsumerConfig) -> Result<Self> {
        let (revoked_tx, revoked_rx) = mpsc::unbounded_channel();
        let context = GroupContext {
            group_id: config.group_id.clone(),
            revoked: revoked_tx,
        };
        let consumer: StreamConsumer<GroupContext> =
            config.client_config()?.create_with_context(context)?;
        Ok(Self {
            consumer: Arc::new(consumer),
            revoked: tokio::sync::Mutex::new(revoked_rx),
            group_id: config.group_id.clone(),
            topics: config.topics.clone(),
            middlewares: Vec::new(),
        })
    }

    /// Appends a middleware; the first one added runs outermost.
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }
}

#[async_trait]
impl Consumer for KafkaConsumer {
    async fn consume(
        &self,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        // One consume loop per member at a time.
        let mut revoked = self.revoked.lock().await;
        let handler = chain(handler, &self.middlewares);
        let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&topics)?;
        tracing::info!(group_id = %self.group_id, topics = ?self.topics, "kafka consumer started");

        let mut workers = PartitionWorkers::new(shutdown.clone());

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                Some(partitions) = revoked.recv() => {
                    workers.revoke(&partitions);
                    continue;
                }
                received = self.consumer.recv() => Some(received.map(|m| to_message(&m))),
            };

            match next {
                None => break Ok(()),
                Some(Ok(msg)) => {
                    // A revocation raised by the poll that produced `msg` must
                    // land before the record is routed to a worker.
                    while let Ok(partitions) = revoked.try_recv() {
                        workers.revoke(&partitions);
                    }
                    let consumer = self.consumer.clone();
                    let handler = handler.clone();
                    let tx = workers.sender(&msg.topic, msg.partition, move |rx, cancel| {
                        run_partition(consumer, handler, rx, cancel)
                    });
                    if tx.send(msg).await.is_err() {
                        tracing::debug!(group_id = %self.group_id, "partition worker stopped, record dropped");
                    }
                }
                Some(Err(e)) if is_fatal(&e) => {
                    tracing::error!(group_id = %self.group_id, error = %e, "kafka consumer failed");
                    break Err(TransportError::Kafka(e));
                }
                Some(Err(e)) => {
                    tracing::warn!(group_id = %self.group_id, error = %e, "kafka consumer error");
                }
            }
        };

        workers.join(&self.group_id).await;
        self.consumer.unsubscribe();
        tracing::info!(group_id = %self.group_id, "kafka consumer stopped");
        result
    }
}

struct PartitionWorker {
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

/// The worker tasks of one group member, one per partition it has records for.
struct PartitionWorkers {
    workers: HashMap<PartitionKey, PartitionWorker>,
    tasks: JoinSet<()>,
    shutdown: CancellationToken,
}

impl PartitionWorkers {
    fn new(shutdown: CancellationToken) -> Self {
        Self {
            workers: HashMap::new(),
            tasks: JoinSet::new(),
            shutdown,
        }
    }

    /// Returns the partition's record queue, spawning `run` as its worker when
    /// the partition has none.
    fn sender<F, Fut>(&mut self, topic: &str, partition: i32, run: F) -> mpsc::Sender<Message>
    where
        F: FnOnce(mpsc::Receiver<Message>, CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = (topic.to_string(), partition);
        if let Some(worker) = self.workers.get(&key) {
            return worker.tx.clone();
        }

        let (tx, rx) = mpsc::channel(PARTITION_BUFFER);
        let cancel = self.shutdown.child_token();
        self.tasks.spawn(run(rx, cancel.clone()));
        self.workers.insert(
            key,
            PartitionWorker {
                tx: tx.clone(),
                cancel,
            },
        );
        tx
    }

    /// Stops the workers of revoked partitions. Records they had buffered are
    /// dropped unhandled and their offsets stay unmarked.
    fn revoke(&mut self, partitions: &[PartitionKey]) {
        for key in partitions {
            if let Some(worker) = self.workers.remove(key) {
                worker.cancel.cancel();
                tracing::debug!(topic = %key.0, partition = key.1, "partition worker stopped");
            }
        }
    }

    #[cfg(test)]
    fn contains(&self, topic: &str, partition: i32) -> bool {
        self.workers.contains_key(&(topic.to_string(), partition))
    }

    /// Closes every queue and waits for the workers to drain.
    async fn join(mut self, group_id: &str) {
        self.workers.clear();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, group_id = %group_id, "partition task failed");
            }
        }
    }
}

fn is_fatal(e: &KafkaError) -> bool {
    matches!(e.rdkafka_error_code(), Some(RDKafkaErrorCode::Fatal))
}

async fn run_partition(
    consumer: Arc<StreamConsumer<GroupContext>>,
    handler: Arc<dyn MessageHandler>,
    mut rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = rx.recv() => match next {
                Some(msg) => msg,
                None => return,
            },
        };

        let handled = tokio::select! {
            _ = cancel.cancelled() => return,
            handled = dispatch(handler.as_ref(), &msg) => handled,
        };

        // The stored offset is the next one to read after a restart.
        if handled
            && let Err(e) = consumer.store_offset(&msg.topic, msg.partition, msg.offset + 1)
        {
            tracing::warn!(
                error = %e,
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                "failed to mark offset"
            );
        }
    }
}

fn to_message(m: &BorrowedMessage<'_>) -> Message {
    let mut headers = HashMap::new();
    if let Some(h) = m.headers() {
        for header in h.iter() {
            if let Some(value) = header.value {
                headers.insert(header.key.to_string(), value.to_vec());
            }
        }
    }

    let timestamp = m
        .timestamp()
        .to_millis()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    Message {
        key: m.key().map(<[u8]>::to_vec).unwrap_or_default(),
        value: m.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        topic: m.topic().to_string(),
        partition: m.partition(),
        offset: m.offset(),
        timestamp,
        headers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_config_requires_brokers() {
        let config = KafkaProducerConfig::new(vec![], "order.paid");
        assert!(matches!(
            config.client_config(),
            Err(TransportError::Config(_))
        ));
    }

    #[test]
    fn test_producer_config_waits_for_all_replicas() {
        let config = KafkaProducerConfig::new(vec!["localhost:9092".into()], "order.paid");
        let client = config.client_config().unwrap();
        assert_eq!(client.get("acks"), Some("all"));
        assert_eq!(client.get("retries"), Some("3"));
        assert_eq!(client.get("message.timeout.ms"), Some("5000"));
    }

    #[test]
    fn test_consumer_config_stores_offsets_manually() {
        let config = KafkaConsumerConfig::new(
            vec!["a:9092".into(), "b:9092".into()],
            "order-service",
            vec!["order.assembled".into()],
        );
        let client = config.client_config().unwrap();
        assert_eq!(client.get("bootstrap.servers"), Some("a:9092,b:9092"));
        assert_eq!(client.get("group.id"), Some("order-service"));
        assert_eq!(client.get("enable.auto.offset.store"), Some("false"));
        assert_eq!(client.get("auto.offset.reset"), Some("earliest"));
    }

    #[test]
    fn test_consumer_config_requires_topics() {
        let config = KafkaConsumerConfig::new(vec!["a:9092".into()], "g", vec![]);
        assert!(matches!(
            config.client_config(),
            Err(TransportError::Config(_))
        ));
    }

    /// Worker that reports every record it sees, tagged with `generation`.
    fn recording_worker(
        generation: u32,
        seen: mpsc::UnboundedSender<(u32, i64)>,
    ) -> impl FnOnce(mpsc::Receiver<Message>, CancellationToken) -> BoxedWorker {
        move |mut rx, cancel| {
            Box::pin(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        next = rx.recv() => match next {
                            Some(msg) => {
                                let _ = seen.send((generation, msg.offset));
                            }
                            None => return,
                        },
                    }
                }
            })
        }
    }

    type BoxedWorker = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

    fn record(partition: i32, offset: i64) -> Message {
        Message::builder()
            .topic("order.paid")
            .partition(partition)
            .offset(offset)
            .build()
    }

    #[tokio::test]
    async fn test_partition_worker_is_reused_until_revoked() {
        let mut workers = PartitionWorkers::new(CancellationToken::new());
        let (seen_tx, mut seen) = mpsc::unbounded_channel();

        let first = workers.sender("order.paid", 0, recording_worker(1, seen_tx.clone()));
        let again = workers.sender("order.paid", 0, recording_worker(2, seen_tx.clone()));
        first.send(record(0, 10)).await.unwrap();
        again.send(record(0, 11)).await.unwrap();

        assert_eq!(seen.recv().await, Some((1, 10)));
        assert_eq!(seen.recv().await, Some((1, 11)));
        assert!(workers.contains("order.paid", 0));

        drop((first, again));
        workers.join("test-group").await;
    }

    #[tokio::test]
    async fn test_revoked_partition_worker_stops_and_is_replaced() {
        let mut workers = PartitionWorkers::new(CancellationToken::new());
        let (seen_tx, mut seen) = mpsc::unbounded_channel();

        let revoked = workers.sender("order.paid", 0, recording_worker(1, seen_tx.clone()));
        let other = workers.sender("order.paid", 1, recording_worker(1, seen_tx.clone()));
        revoked.send(record(0, 10)).await.unwrap();
        assert_eq!(seen.recv().await, Some((1, 10)));

        workers.revoke(&[("order.paid".to_string(), 0), ("order.paid".to_string(), 9)]);

        assert!(!workers.contains("order.paid", 0));
        assert!(workers.contains("order.paid", 1));
        tokio::time::timeout(Duration::from_secs(5), revoked.closed())
            .await
            .expect("revoked worker kept running");
        assert!(revoked.send(record(0, 11)).await.is_err());

        // Reassignment starts over from the committed offset on a new worker.
        let fresh = workers.sender("order.paid", 0, recording_worker(2, seen_tx.clone()));
        fresh.send(record(0, 11)).await.unwrap();
        assert_eq!(seen.recv().await, Some((2, 11)));

        other.send(record(1, 3)).await.unwrap();
        assert_eq!(seen.recv().await, Some((1, 3)));

        drop((revoked, other, fresh));
        workers.join("test-group").await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_every_partition_worker() {
        let shutdown = CancellationToken::new();
        let mut workers = PartitionWorkers::new(shutdown.clone());
        let (seen_tx, _seen) = mpsc::unbounded_channel();

        let p0 = workers.sender("order.paid", 0, recording_worker(1, seen_tx.clone()));
        let p1 = workers.sender("order.paid", 1, recording_worker(1, seen_tx));
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), async {
            p0.closed().await;
            p1.closed().await;
        })
        .await
        .expect("workers ignored shutdown");
        workers.join("test-group").await;
    }

    #[tokio::test]
    async fn test_producer_creation_does_not_connect() {
        let config = KafkaProducerConfig::new(vec!["127.0.0.1:1".into()], "order.paid");
        let producer = KafkaProducer::new(&config).unwrap();
        assert_eq!(producer.topic(), "order.paid");
    }
}
