//! Broker plumbing for the sale-notification pipeline.
//!
//! This library provides:
//! - **Topology**: one durable direct exchange bound to one durable queue
//! - **Publisher**: lazy, self-healing connection with retry and backoff
//! - **Consumer**: prefetch-bounded, manually acknowledged worker loop
//! - **Decision**: per-delivery outcome computed without a live broker
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  publish   ┌──────────────────────────┐  deliver  ┌──────────────┐
//! │  Publisher  │──────────▶│ exchange ──key──▶ queue  │─────────▶│ConsumerWorker│
//! └──────┬──────┘            └──────────────────────────┘           └──────┬───────┘
//!        │ ConnectionManager                                               │ decide()
//!        ▼                                                                 ▼
//!   Connector ─▶ BrokerSession  (amqp::AmqpConnector | memory::InMemoryBroker)  Processor
//! ```
//!
//! # Example
//!
//! ```ignore
//! use messaging::{amqp::AmqpConnector, ConsumerConfig, ConsumerWorker, Publisher, Topology};
//!
//! let config = BrokerConfig::from_env()?.with_connection_name("SalesPublisher");
//! let publisher = Publisher::new(AmqpConnector::from_config(&config), Topology::from_config(&config));
//! publisher.publish(&notification).await?;
//!
//! let worker = ConsumerWorker::new(
//!     AmqpConnector::from_config(&config),
//!     Topology::from_config(&config),
//!     SaleProcessor::new(ledger),
//!     ConsumerConfig::from_broker_config(&config),
//! );
//! worker.run(shutdown_rx).await?;
//! ```

mod broker;
mod connection;
mod consumer;
mod error;
mod message;
pub mod metrics;
mod processor;
mod publisher;
mod retry;
mod topology;

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod memory;

pub use broker::{
    Acknowledger, BrokerSession, Connector, Delivery, DeliveryStream, MessageProperties,
    JSON_CONTENT_TYPE,
};
pub use connection::{ConnectionManager, ConnectionState};
pub use consumer::{decide, AckReason, ConsumerConfig, ConsumerState, ConsumerWorker, Decision};
pub use error::{BrokerError, BrokerResult, ProcessingError};
pub use message::Message;
pub use crate::metrics::BrokerMetrics;
pub use processor::{FailingProcessor, NoOpProcessor, Processor};
pub use publisher::Publisher;
pub use retry::{BackoffStrategy, RetryOutcome, RetryPolicy};
pub use topology::Topology;
