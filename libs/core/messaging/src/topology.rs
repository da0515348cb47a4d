//! Broker topology: one durable direct exchange, one durable queue, one binding.

use core_config::broker::BrokerConfig;

/// Names of the entities both the publisher and the consumer declare.
///
/// Declaring is idempotent on the broker side, so either party may do it
/// first and re-declaring with the same attributes is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
}

impl Topology {
    pub fn new(
        queue: impl Into<String>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(&config.queue, &config.exchange, &config.routing_key)
    }
}
