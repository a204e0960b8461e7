//! In-process broker with partitioned topics, consumer groups and offset commits.
//!
//! The broker keeps the same delivery contract as the Kafka transport: records
//! are routed to a partition by key, each partition is consumed sequentially by
//! exactly one member of a group, and a group's committed offset for a
//! partition is the highest marked offset plus one. An unmarked (failed)
//! record is therefore superseded as soon as a later record on the same
//! partition is marked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::{Consumer, Producer};
use crate::handler::{MessageHandler, Middleware, chain, dispatch};
use crate::partitioner::partition_for_key;
use crate::{Message, Result, TransportError};

/// Number of partitions created per topic unless configured otherwise.
pub const DEFAULT_PARTITIONS: usize = 3;

/// An in-memory broker shared by producers and consumers in one process.
///
/// Cloning is cheap; all clones share the same topics and groups.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    partitions: usize,
    state: Mutex<BrokerState>,
    appended: watch::Sender<u64>,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Vec<Vec<Message>>>,
    groups: HashMap<String, GroupState>,
    unavailable: bool,
    next_member_id: u64,
}

struct GroupState {
    members: Vec<GroupMember>,
    committed: HashMap<(String, i32), i64>,
    closed: bool,
    generation: watch::Sender<u64>,
}

impl GroupState {
    fn new() -> Self {
        Self {
            members: Vec::new(),
            committed: HashMap::new(),
            closed: false,
            generation: watch::channel(0).0,
        }
    }

    fn bump_generation(&self) {
        self.generation.send_modify(|g| *g += 1);
    }
}

struct GroupMember {
    id: u64,
    topics: Vec<String>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Creates a broker with [`DEFAULT_PARTITIONS`] partitions per topic.
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    /// Creates a broker with the given number of partitions per topic.
    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                partitions: partitions.max(1),
                state: Mutex::new(BrokerState::default()),
                appended: watch::channel(0).0,
            }),
        }
    }

    /// Number of partitions each topic has.
    pub fn partition_count(&self) -> usize {
        self.inner.partitions
    }

    /// Returns a producer publishing to `topic`.
    pub fn producer(&self, topic: impl Into<String>) -> MemoryProducer {
        MemoryProducer {
            broker: self.clone(),
            topic: topic.into(),
        }
    }

    /// Returns a consumer that joins `group_id` for the given topics.
    pub fn consumer<I, T>(&self, group_id: impl Into<String>, topics: I) -> MemoryConsumer
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        MemoryConsumer {
            broker: self.clone(),
            group_id: group_id.into(),
            topics: topics.into_iter().map(Into::into).collect(),
            middlewares: Vec::new(),
        }
    }

    /// Partition a key is routed to.
    pub fn partition_for(&self, key: &[u8]) -> i32 {
        partition_for_key(key, self.inner.partitions)
    }

    /// All records in a topic, ordered by partition then offset.
    pub fn messages(&self, topic: &str) -> Vec<Message> {
        self.lock()
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Committed offset (next offset to read) of a group on a partition.
    pub fn committed_offset(&self, group_id: &str, topic: &str, partition: i32) -> Option<i64> {
        self.lock()
            .groups
            .get(group_id)
            .and_then(|g| g.committed.get(&(topic.to_string(), partition)).copied())
    }

    /// Number of members currently joined to a group.
    pub fn member_count(&self, group_id: &str) -> usize {
        self.lock()
            .groups
            .get(group_id)
            .map(|g| g.members.len())
            .unwrap_or(0)
    }

    /// Makes every subsequent publish fail, simulating a lost broker connection.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Closes a consumer group. Attached consumers return
    /// [`TransportError::GroupClosed`] and later joins are refused.
    pub fn close_group(&self, group_id: &str) {
        let mut state = self.lock();
        let group = state
            .groups
            .entry(group_id.to_string())
            .or_insert_with(GroupState::new);
        group.closed = true;
        group.bump_generation();
        tracing::info!(group_id, "consumer group closed");
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        // A poisoned lock only means a panic happened while holding it; the
        // broker state itself is still consistent.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<(i32, i64)> {
        let partitions = self.inner.partitions;
        let mut state = self.lock();
        if state.unavailable {
            return Err(TransportError::BrokerUnavailable(
                "in-memory broker is marked unavailable".to_string(),
            ));
        }

        let partition = partition_for_key(key, partitions);
        let log = &mut state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions])[partition as usize];
        let offset = log.len() as i64;
        log.push(
            Message::builder()
                .key(key)
                .value(value)
                .topic(topic)
                .partition(partition)
                .offset(offset)
                .build(),
        );
        drop(state);

        self.inner.appended.send_modify(|n| *n += 1);
        Ok((partition, offset))
    }

    fn join(&self, group_id: &str, topics: &[String]) -> Result<u64> {
        let partitions = self.inner.partitions;
        let mut state = self.lock();
        for topic in topics {
            state
                .topics
                .entry(topic.clone())
                .or_insert_with(|| vec![Vec::new(); partitions]);
        }

        state.next_member_id += 1;
        let member_id = state.next_member_id;
        let group = state
            .groups
            .entry(group_id.to_string())
            .or_insert_with(GroupState::new);
        if group.closed {
            return Err(TransportError::GroupClosed {
                group_id: group_id.to_string(),
            });
        }

        group.members.push(GroupMember {
            id: member_id,
            topics: topics.to_vec(),
        });
        group.bump_generation();
        tracing::debug!(group_id, member_id, "member joined consumer group");
        Ok(member_id)
    }

    fn leave(&self, group_id: &str, member_id: u64) {
        let mut state = self.lock();
        if let Some(group) = state.groups.get_mut(group_id) {
            group.members.retain(|m| m.id != member_id);
            group.bump_generation();
            tracing::debug!(group_id, member_id, "member left consumer group");
        }
    }

    fn watch_group(&self, group_id: &str) -> Option<watch::Receiver<u64>> {
        self.lock()
            .groups
            .get(group_id)
            .map(|g| g.generation.subscribe())
    }

    fn is_group_closed(&self, group_id: &str) -> bool {
        self.lock().groups.get(group_id).is_some_and(|g| g.closed)
    }

    /// Current generation and the partitions owned by `member_id`.
    ///
    /// Partitions of each topic are spread round-robin over the members
    /// subscribed to it, in join order.
    fn assignment(&self, group_id: &str, member_id: u64) -> Result<(u64, Vec<(String, i32)>)> {
        let state = self.lock();
        let closed = || TransportError::GroupClosed {
            group_id: group_id.to_string(),
        };
        let group = state.groups.get(group_id).ok_or_else(closed)?;
        if group.closed {
            return Err(closed());
        }
        let member = group
            .members
            .iter()
            .find(|m| m.id == member_id)
            .ok_or_else(closed)?;

        let mut assigned = Vec::new();
        for topic in &member.topics {
            let subscribers: Vec<u64> = group
                .members
                .iter()
                .filter(|m| m.topics.contains(topic))
                .map(|m| m.id)
                .collect();
            let partitions = state.topics.get(topic).map(Vec::len).unwrap_or(0);
            for partition in 0..partitions {
                if subscribers[partition % subscribers.len()] == member_id {
                    assigned.push((topic.clone(), partition as i32));
                }
            }
        }

        Ok((*group.generation.borrow(), assigned))
    }

    fn fetch(&self, topic: &str, partition: i32, offset: i64) -> Option<Message> {
        let state = self.lock();
        let log = state.topics.get(topic)?.get(partition as usize)?;
        usize::try_from(offset)
            .ok()
            .and_then(|idx| log.get(idx))
            .cloned()
    }

    fn mark(&self, group_id: &str, topic: &str, partition: i32, offset: i64) {
        let mut state = self.lock();
        if let Some(group) = state.groups.get_mut(group_id) {
            let committed = group
                .committed
                .entry((topic.to_string(), partition))
                .or_insert(0);
            *committed = (*committed).max(offset + 1);
        }
    }
}

/// Producer publishing to one topic of an [`InMemoryBroker`].
#[derive(Clone)]
pub struct MemoryProducer {
    broker: InMemoryBroker,
    topic: String,
}

impl MemoryProducer {
    /// Topic this producer publishes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl Producer for MemoryProducer {
    async fn send(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let (partition, offset) = self.broker.publish(&self.topic, key, value)?;
        metrics::counter!("transport_messages_sent_total").increment(1);
        tracing::debug!(topic = %self.topic, partition, offset, "message published");
        Ok(())
    }
}

/// Consumer-group member of an [`InMemoryBroker`].
#[derive(Clone)]
pub struct MemoryConsumer {
    broker: InMemoryBroker,
    group_id: String,
    topics: Vec<String>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MemoryConsumer {
    /// Appends a middleware; the first one added runs outermost.
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Group this consumer joins.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

/// Leaves the group when a consume call ends, however it ends.
struct Membership<'a> {
    broker: &'a InMemoryBroker,
    group_id: &'a str,
    member_id: u64,
}

impl Drop for Membership<'_> {
    fn drop(&mut self) {
        self.broker.leave(self.group_id, self.member_id);
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn consume(
        &self,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let handler = chain(handler, &self.middlewares);
        let member_id = self.broker.join(&self.group_id, &self.topics)?;
        let _membership = Membership {
            broker: &self.broker,
            group_id: &self.group_id,
            member_id,
        };

        loop {
            let Some(mut generation_rx) = self.broker.watch_group(&self.group_id) else {
                return Err(TransportError::GroupClosed {
                    group_id: self.group_id.clone(),
                });
            };
            let (generation, assignment) = self.broker.assignment(&self.group_id, member_id)?;

            let session = shutdown.child_token();
            let mut partitions = JoinSet::new();
            for (topic, partition) in assignment {
                partitions.spawn(run_partition(
                    self.broker.clone(),
                    self.group_id.clone(),
                    topic,
                    partition,
                    handler.clone(),
                    session.clone(),
                ));
            }
            tracing::info!(
                group_id = %self.group_id,
                generation,
                partitions = partitions.len(),
                "consumer session started"
            );

            let rebalanced = tokio::select! {
                _ = shutdown.cancelled() => false,
                _ = generation_changed(&mut generation_rx, generation) => true,
            };

            session.cancel();
            while let Some(joined) = partitions.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, group_id = %self.group_id, "partition task failed");
                }
            }

            if !rebalanced {
                tracing::info!(group_id = %self.group_id, "consumer stopped");
                return Ok(());
            }
            if self.broker.is_group_closed(&self.group_id) {
                return Err(TransportError::GroupClosed {
                    group_id: self.group_id.clone(),
                });
            }
            tracing::info!(group_id = %self.group_id, "consumer group rebalancing");
        }
    }
}

async fn generation_changed(rx: &mut watch::Receiver<u64>, seen: u64) {
    loop {
        if *rx.borrow_and_update() != seen {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Sequentially delivers one partition to the handler until the session ends.
async fn run_partition(
    broker: InMemoryBroker,
    group_id: String,
    topic: String,
    partition: i32,
    handler: Arc<dyn MessageHandler>,
    session: CancellationToken,
) {
    let mut position = broker
        .committed_offset(&group_id, &topic, partition)
        .unwrap_or(0);
    let mut appended = broker.inner.appended.subscribe();

    while !session.is_cancelled() {
        let _ = appended.borrow_and_update();
        match broker.fetch(&topic, partition, position) {
            Some(msg) => {
                let handled = tokio::select! {
                    _ = session.cancelled() => return,
                    handled = dispatch(handler.as_ref(), &msg) => handled,
                };
                if handled {
                    broker.mark(&group_id, &topic, partition, msg.offset);
                }
                position = msg.offset + 1;
            }
            None => {
                tokio::select! {
                    _ = session.cancelled() => return,
                    changed = appended.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_appends_with_increasing_offsets() {
        let broker = InMemoryBroker::with_partitions(1);
        let producer = broker.producer("orders");

        producer.send(b"k", b"one").await.unwrap();
        producer.send(b"k", b"two").await.unwrap();

        let messages = broker.messages("orders");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].offset, 0);
        assert_eq!(messages[1].offset, 1);
        assert_eq!(messages[1].value, b"two");
        assert_eq!(messages[1].topic, "orders");
    }

    #[tokio::test]
    async fn test_unavailable_broker_rejects_send() {
        let broker = InMemoryBroker::new();
        broker.set_unavailable(true);

        let err = broker.producer("orders").send(b"k", b"v").await.unwrap_err();
        assert!(matches!(err, TransportError::BrokerUnavailable(_)));
        assert!(broker.messages("orders").is_empty());
    }

    #[test]
    fn test_assignment_splits_partitions_between_members() {
        let broker = InMemoryBroker::with_partitions(4);
        let topics = vec!["orders".to_string()];
        let a = broker.join("g", &topics).unwrap();
        let b = broker.join("g", &topics).unwrap();

        let (_, assigned_a) = broker.assignment("g", a).unwrap();
        let (_, assigned_b) = broker.assignment("g", b).unwrap();

        let orders = |p: i32| ("orders".to_string(), p);
        assert_eq!(assigned_a, vec![orders(0), orders(2)]);
        assert_eq!(assigned_b, vec![orders(1), orders(3)]);
    }

    #[test]
    fn test_join_bumps_generation() {
        let broker = InMemoryBroker::new();
        let topics = vec!["orders".to_string()];
        let a = broker.join("g", &topics).unwrap();
        let (gen_before, _) = broker.assignment("g", a).unwrap();
        broker.join("g", &topics).unwrap();
        let (gen_after, _) = broker.assignment("g", a).unwrap();
        assert!(gen_after > gen_before);
    }

    #[test]
    fn test_mark_keeps_highest_offset() {
        let broker = InMemoryBroker::new();
        broker.join("g", &["orders".to_string()]).unwrap();

        broker.mark("g", "orders", 0, 4);
        broker.mark("g", "orders", 0, 2);

        assert_eq!(broker.committed_offset("g", "orders", 0), Some(5));
    }

    #[test]
    fn test_closed_group_refuses_join() {
        let broker = InMemoryBroker::new();
        broker.close_group("g");
        let err = broker.join("g", &["orders".to_string()]).unwrap_err();
        assert!(matches!(err, TransportError::GroupClosed { .. }));
    }
}
