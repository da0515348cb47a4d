//! Backend-neutral broker seam.
//!
//! [`Connector`] opens sessions; a [`BrokerSession`] is one live
//! connection plus channel. The AMQP backend lives in [`crate::amqp`],
//! the test double in [`crate::memory`].

use crate::error::BrokerResult;
use crate::topology::Topology;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Properties attached to every published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageProperties {
    pub content_type: String,
    /// Persistent messages survive a broker restart (delivery mode 2)
    pub persistent: bool,
}

impl MessageProperties {
    pub fn json_persistent() -> Self {
        Self {
            content_type: JSON_CONTENT_TYPE.to_string(),
            persistent: true,
        }
    }
}

impl Default for MessageProperties {
    fn default() -> Self {
        Self::json_persistent()
    }
}

/// Opens new broker sessions.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: BrokerSession;

    async fn connect(&self) -> BrokerResult<Self::Session>;
}

/// One open connection with one channel on it.
#[async_trait]
pub trait BrokerSession: Clone + Send + Sync + 'static {
    /// Whether both the connection and the channel are still usable.
    fn is_open(&self) -> bool;

    /// Declare exchange, queue and binding. Idempotent.
    async fn declare_topology(&self, topology: &Topology) -> BrokerResult<()>;

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: &MessageProperties,
    ) -> BrokerResult<()>;

    /// Limit the number of unacknowledged deliveries on this channel.
    async fn set_prefetch(&self, prefetch_count: u16) -> BrokerResult<()>;

    /// Start consuming with manual acknowledgement.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> BrokerResult<DeliveryStream>;

    /// Close the channel, then the connection.
    async fn close(&self) -> BrokerResult<()>;
}

pub type DeliveryStream = BoxStream<'static, BrokerResult<Delivery>>;

/// Settles a single delivery.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> BrokerResult<()>;

    async fn nack(&self, requeue: bool) -> BrokerResult<()>;
}

/// A message received from the queue, awaiting settlement.
pub struct Delivery {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub payload: Vec<u8>,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        delivery_tag: u64,
        redelivered: bool,
        payload: Vec<u8>,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            delivery_tag,
            redelivered,
            payload,
            acker,
        }
    }

    pub async fn ack(&self) -> BrokerResult<()> {
        self.acker.ack().await
    }

    pub async fn nack(&self, requeue: bool) -> BrokerResult<()> {
        self.acker.nack(requeue).await
    }

    /// Negative-acknowledge without requeue; the broker drops or dead-letters it.
    pub async fn reject(&self) -> BrokerResult<()> {
        self.nack(false).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("redelivered", &self.redelivered)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
