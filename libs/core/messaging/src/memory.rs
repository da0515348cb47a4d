//! In-memory broker for tests.
//!
//! Routes published messages through declared bindings into queues,
//! honours prefetch and manual acknowledgement, and records everything a
//! test may want to inspect: declared topology, publishes with their
//! properties, acks, nacks with the requeue flag, redelivery counts and
//! close order. Connect and publish failures can be injected.

use crate::broker::{
    Acknowledger, BrokerSession, Connector, Delivery, DeliveryStream, MessageProperties,
};
use crate::error::{BrokerError, BrokerResult};
use crate::topology::Topology;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::time::Instant;

/// A message accepted by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub properties: MessageProperties,
}

/// What a session released when it was closed, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseEvent {
    Channel,
    Connection,
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    payload: Vec<u8>,
    redelivered: bool,
    /// Tag of the first delivery of this message
    first_tag: Option<u64>,
}

#[derive(Debug)]
struct Unacked {
    session_id: u64,
    queue: String,
    message: QueuedMessage,
}

#[derive(Default)]
struct BrokerState {
    generation: u64,
    next_session_id: u64,
    next_tag: u64,
    connects: usize,
    fail_connects: u32,
    fail_publishes: u32,
    closed_sessions: HashSet<u64>,
    declared: Vec<Topology>,
    bindings: Vec<(String, String, String)>,
    queues: HashMap<String, VecDeque<QueuedMessage>>,
    unacked: HashMap<u64, Unacked>,
    prefetch: HashMap<u64, u16>,
    prefetch_history: Vec<u16>,
    published: Vec<PublishedMessage>,
    publish_attempts: Vec<Instant>,
    acks: Vec<u64>,
    nacks: Vec<(u64, bool)>,
    redeliveries: HashMap<u64, u32>,
    close_events: Vec<CloseEvent>,
}

impl BrokerState {
    fn is_open(&self, session: &SessionId) -> bool {
        session.generation == self.generation && !self.closed_sessions.contains(&session.id)
    }

    fn in_flight(&self, session_id: u64) -> usize {
        self.unacked
            .values()
            .filter(|u| u.session_id == session_id)
            .count()
    }

    /// Return unacked messages of dead sessions to the head of their queue.
    fn requeue_orphans(&mut self, alive: impl Fn(u64) -> bool) {
        let orphaned: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, u)| !alive(u.session_id))
            .map(|(tag, _)| *tag)
            .collect();

        for tag in orphaned {
            if let Some(unacked) = self.unacked.remove(&tag) {
                self.requeue(unacked);
            }
        }
    }

    fn requeue(&mut self, unacked: Unacked) {
        let mut message = unacked.message;
        if let Some(first) = message.first_tag {
            *self.redeliveries.entry(first).or_default() += 1;
        }
        message.redelivered = true;
        self.queues
            .entry(unacked.queue)
            .or_default()
            .push_front(message);
    }
}

struct Inner {
    state: Mutex<BrokerState>,
    notify: Notify,
}

/// Shared handle to one in-memory broker; clones see the same state.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BrokerState::default()),
                notify: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn wake(&self) {
        self.inner.notify.notify_waiters();
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().fail_connects = n;
    }

    /// Make the next `n` publish attempts fail.
    pub fn fail_next_publishes(&self, n: u32) {
        self.lock().fail_publishes = n;
    }

    /// Simulate a broker restart: every open session dies, consume streams
    /// end and unacknowledged deliveries go back to their queue.
    pub fn drop_connections(&self) {
        {
            let mut state = self.lock();
            state.generation += 1;
            state.requeue_orphans(|_| false);
        }
        self.wake();
    }

    /// Put a raw payload straight onto a queue.
    pub fn enqueue(&self, queue: &str, payload: impl Into<Vec<u8>>) {
        self.lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(QueuedMessage {
                payload: payload.into(),
                redelivered: false,
                first_tag: None,
            });
        self.wake();
    }

    /// Successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    pub fn declared_topologies(&self) -> Vec<Topology> {
        self.lock().declared.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    /// Instants of every publish attempt, failed ones included.
    pub fn publish_attempt_times(&self) -> Vec<Instant> {
        self.lock().publish_attempts.clone()
    }

    pub fn queue_depth(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    pub fn unacked_count(&self) -> usize {
        self.lock().unacked.len()
    }

    pub fn prefetch_history(&self) -> Vec<u16> {
        self.lock().prefetch_history.clone()
    }

    pub fn acks(&self) -> Vec<u64> {
        self.lock().acks.clone()
    }

    /// `(delivery_tag, requeue)` for every nack.
    pub fn nacks(&self) -> Vec<(u64, bool)> {
        self.lock().nacks.clone()
    }

    /// How many times the message first delivered under `tag` was put back
    /// on its queue.
    pub fn redelivery_count(&self, tag: u64) -> u32 {
        self.lock().redeliveries.get(&tag).copied().unwrap_or(0)
    }

    pub fn close_events(&self) -> Vec<CloseEvent> {
        self.lock().close_events.clone()
    }
}

#[async_trait]
impl Connector for InMemoryBroker {
    type Session = InMemorySession;

    async fn connect(&self) -> BrokerResult<InMemorySession> {
        let mut state = self.lock();
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(BrokerError::Connection("connection refused".to_string()));
        }

        state.connects += 1;
        state.next_session_id += 1;
        Ok(InMemorySession {
            broker: self.clone(),
            id: SessionId {
                id: state.next_session_id,
                generation: state.generation,
            },
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct SessionId {
    id: u64,
    generation: u64,
}

/// One connection and channel on an [`InMemoryBroker`].
#[derive(Clone)]
pub struct InMemorySession {
    broker: InMemoryBroker,
    id: SessionId,
}

enum Next {
    Delivery(Delivery),
    Wait,
    Closed,
}

impl InMemorySession {
    fn ensure_open(&self, state: &BrokerState) -> BrokerResult<()> {
        if state.is_open(&self.id) {
            Ok(())
        } else {
            Err(BrokerError::Connection("channel closed".to_string()))
        }
    }

    fn next_delivery(&self, queue: &str) -> Next {
        let mut state = self.broker.lock();
        if !state.is_open(&self.id) {
            return Next::Closed;
        }

        let prefetch = state.prefetch.get(&self.id.id).copied().unwrap_or(0);
        if prefetch > 0 && state.in_flight(self.id.id) >= usize::from(prefetch) {
            return Next::Wait;
        }

        let Some(mut message) = state.queues.get_mut(queue).and_then(VecDeque::pop_front) else {
            return Next::Wait;
        };

        state.next_tag += 1;
        let tag = state.next_tag;
        message.first_tag.get_or_insert(tag);

        let delivery = Delivery::new(
            tag,
            message.redelivered,
            message.payload.clone(),
            Box::new(InMemoryAcker {
                session: self.clone(),
                tag,
            }),
        );
        state.unacked.insert(
            tag,
            Unacked {
                session_id: self.id.id,
                queue: queue.to_string(),
                message,
            },
        );
        Next::Delivery(delivery)
    }
}

#[async_trait]
impl BrokerSession for InMemorySession {
    fn is_open(&self) -> bool {
        self.broker.lock().is_open(&self.id)
    }

    async fn declare_topology(&self, topology: &Topology) -> BrokerResult<()> {
        let mut state = self.broker.lock();
        self.ensure_open(&state)?;

        state.declared.push(topology.clone());
        state.queues.entry(topology.queue.clone()).or_default();

        let binding = (
            topology.exchange.clone(),
            topology.routing_key.clone(),
            topology.queue.clone(),
        );
        if !state.bindings.contains(&binding) {
            state.bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: &MessageProperties,
    ) -> BrokerResult<()> {
        {
            let mut state = self.broker.lock();
            state.publish_attempts.push(Instant::now());
            self.ensure_open(&state)?;

            if state.fail_publishes > 0 {
                state.fail_publishes -= 1;
                return Err(BrokerError::Publish("broker unavailable".to_string()));
            }

            state.published.push(PublishedMessage {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                payload: payload.to_vec(),
                properties: properties.clone(),
            });

            let targets: Vec<String> = state
                .bindings
                .iter()
                .filter(|(ex, key, _)| ex == exchange && key == routing_key)
                .map(|(_, _, queue)| queue.clone())
                .collect();
            for queue in targets {
                state.queues.entry(queue).or_default().push_back(QueuedMessage {
                    payload: payload.to_vec(),
                    redelivered: false,
                    first_tag: None,
                });
            }
        }
        self.broker.wake();
        Ok(())
    }

    async fn set_prefetch(&self, prefetch_count: u16) -> BrokerResult<()> {
        let mut state = self.broker.lock();
        self.ensure_open(&state)?;
        state.prefetch.insert(self.id.id, prefetch_count);
        state.prefetch_history.push(prefetch_count);
        Ok(())
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> BrokerResult<DeliveryStream> {
        self.ensure_open(&self.broker.lock())?;

        let queue = queue.to_string();
        let stream = futures::stream::unfold(
            (self.clone(), queue),
            |(session, queue)| async move {
                loop {
                    let broker = session.broker.clone();
                    let notified = broker.inner.notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    match session.next_delivery(&queue) {
                        Next::Delivery(delivery) => {
                            return Some((Ok::<_, BrokerError>(delivery), (session, queue)));
                        }
                        Next::Closed => return None,
                        Next::Wait => notified.await,
                    }
                }
            },
        );
        Ok(Box::pin(stream))
    }

    async fn close(&self) -> BrokerResult<()> {
        {
            let mut state = self.broker.lock();
            if !state.closed_sessions.insert(self.id.id) {
                return Ok(());
            }
            state.close_events.push(CloseEvent::Channel);
            state.close_events.push(CloseEvent::Connection);

            let id = self.id.id;
            state.requeue_orphans(|session_id| session_id != id);
        }
        self.broker.wake();
        Ok(())
    }
}

struct InMemoryAcker {
    session: InMemorySession,
    tag: u64,
}

impl InMemoryAcker {
    fn settle(&self, requeue: Option<bool>) -> BrokerResult<()> {
        {
            let mut state = self.session.broker.lock();
            self.session
                .ensure_open(&state)
                .map_err(|_| BrokerError::Consume("channel closed before settlement".to_string()))?;

            let unacked = state.unacked.remove(&self.tag).ok_or_else(|| {
                BrokerError::Consume(format!("unknown delivery tag {}", self.tag))
            })?;

            match requeue {
                None => state.acks.push(self.tag),
                Some(requeue) => {
                    state.nacks.push((self.tag, requeue));
                    if requeue {
                        state.requeue(unacked);
                    }
                }
            }
        }
        self.session.broker.wake();
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for InMemoryAcker {
    async fn ack(&self) -> BrokerResult<()> {
        self.settle(None)
    }

    async fn nack(&self, requeue: bool) -> BrokerResult<()> {
        self.settle(Some(requeue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn topology() -> Topology {
        Topology::new("q", "ex", "key")
    }

    async fn open(broker: &InMemoryBroker) -> InMemorySession {
        let session = broker.connect().await.unwrap();
        session.declare_topology(&topology()).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_publish_routes_only_matching_key() {
        let broker = InMemoryBroker::new();
        let session = open(&broker).await;
        let props = MessageProperties::json_persistent();

        session.publish("ex", "key", b"a", &props).await.unwrap();
        session.publish("ex", "other", b"b", &props).await.unwrap();

        assert_eq!(broker.published().len(), 2);
        assert_eq!(broker.queue_depth("q"), 1);
    }

    #[tokio::test]
    async fn test_prefetch_bounds_unacked_deliveries() {
        let broker = InMemoryBroker::new();
        let session = open(&broker).await;
        session.set_prefetch(2).await.unwrap();
        for i in 0..5u8 {
            broker.enqueue("q", vec![i]);
        }

        let mut stream = session.consume("q", "test").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        let _second = stream.next().await.unwrap().unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(blocked.is_err());
        assert_eq!(broker.unacked_count(), 2);

        first.ack().await.unwrap();
        let third = stream.next().await.unwrap().unwrap();
        assert_eq!(third.payload, vec![2]);
    }

    #[tokio::test]
    async fn test_nack_with_requeue_counts_redelivery() {
        let broker = InMemoryBroker::new();
        let session = open(&broker).await;
        broker.enqueue("q", b"x".to_vec());

        let mut stream = session.consume("q", "test").await.unwrap();
        let delivery = stream.next().await.unwrap().unwrap();
        let tag = delivery.delivery_tag;
        delivery.nack(true).await.unwrap();

        let again = stream.next().await.unwrap().unwrap();
        assert!(again.redelivered);
        assert_eq!(broker.redelivery_count(tag), 1);
        assert_eq!(broker.nacks(), vec![(tag, true)]);
    }

    #[tokio::test]
    async fn test_reject_does_not_redeliver() {
        let broker = InMemoryBroker::new();
        let session = open(&broker).await;
        broker.enqueue("q", b"x".to_vec());

        let mut stream = session.consume("q", "test").await.unwrap();
        let delivery = stream.next().await.unwrap().unwrap();
        delivery.reject().await.unwrap();

        assert_eq!(broker.nacks(), vec![(delivery.delivery_tag, false)]);
        assert_eq!(broker.redelivery_count(delivery.delivery_tag), 0);
        assert_eq!(broker.queue_depth("q"), 0);
    }

    #[tokio::test]
    async fn test_drop_connections_ends_stream_and_requeues_unacked() {
        let broker = InMemoryBroker::new();
        let session = open(&broker).await;
        broker.enqueue("q", b"x".to_vec());

        let mut stream = session.consume("q", "test").await.unwrap();
        let delivery = stream.next().await.unwrap().unwrap();

        broker.drop_connections();

        assert!(stream.next().await.is_none());
        assert!(!session.is_open());
        assert!(delivery.ack().await.is_err());
        assert_eq!(broker.queue_depth("q"), 1);
        assert_eq!(broker.redelivery_count(delivery.delivery_tag), 1);
    }
}
