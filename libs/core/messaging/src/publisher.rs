//! Sale publisher: serialize once, publish persistently, retry with backoff.

use crate::broker::{BrokerSession, Connector, MessageProperties};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{BrokerError, BrokerResult};
use crate::metrics::BrokerMetrics;
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::topology::Topology;
use serde::Serialize;
use tracing::{debug, error, info};

/// Publishes messages to the configured exchange under the configured
/// routing key.
///
/// The connection is opened on the first publish and re-opened after a
/// failure. Every attempt, reconnect included, runs under the
/// [`RetryPolicy`]; when the policy is exhausted the last cause is
/// returned to the caller. Errors that cannot succeed on retry, such as
/// a concurrent [`close`](Self::close), end the loop at once and are
/// returned as they are.
pub struct Publisher<C: Connector> {
    connection: ConnectionManager<C>,
    retry: RetryPolicy,
    properties: MessageProperties,
    metrics: BrokerMetrics,
}

impl<C: Connector> Publisher<C> {
    pub fn new(connector: C, topology: Topology) -> Self {
        let metrics = BrokerMetrics::new(&topology.queue);
        Self {
            connection: ConnectionManager::new(connector, topology),
            retry: RetryPolicy::default(),
            properties: MessageProperties::json_persistent(),
            metrics,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn topology(&self) -> &Topology {
        self.connection.topology()
    }

    /// Serialize `message` as JSON and publish it.
    pub async fn publish<T>(&self, message: &T) -> BrokerResult<()>
    where
        T: Serialize + ?Sized,
    {
        if self.state() == ConnectionState::Closed {
            return Err(BrokerError::Closed);
        }

        let payload = serde_json::to_vec(message)?;

        let body = payload.as_slice();
        let outcome = self
            .retry
            .run_if(
                "publish",
                move |_attempt| self.try_publish(body),
                BrokerError::is_retryable,
            )
            .await;

        match outcome {
            RetryOutcome::Succeeded { attempts, .. } => {
                self.metrics.published();
                self.metrics.publish_retries(attempts - 1);
                debug!(
                    exchange = %self.topology().exchange,
                    routing_key = %self.topology().routing_key,
                    attempts,
                    bytes = payload.len(),
                    "Message published"
                );
                Ok(())
            }
            RetryOutcome::Exhausted { error: cause, attempts } => {
                self.metrics.publish_retries(attempts - 1);
                self.metrics.publish_failed();
                error!(
                    exchange = %self.topology().exchange,
                    attempts,
                    error = %cause,
                    "Publish failed"
                );
                if !cause.is_retryable() {
                    return Err(cause);
                }
                Err(BrokerError::RetriesExhausted {
                    attempts,
                    source: Box::new(cause),
                })
            }
        }
    }

    async fn try_publish(&self, payload: &[u8]) -> BrokerResult<()> {
        let session = self.connection.session().await?;
        let topology = self.connection.topology();

        let result = session
            .publish(
                &topology.exchange,
                &topology.routing_key,
                payload,
                &self.properties,
            )
            .await;

        if result.is_err() {
            self.connection.invalidate().await;
        }
        result
    }

    /// Release channel then connection. Later publishes fail with
    /// [`BrokerError::Closed`].
    pub async fn close(&self) -> BrokerResult<()> {
        let result = self.connection.close().await;
        info!("Publisher closed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{CloseEvent, InMemoryBroker};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn topology() -> Topology {
        Topology::new("sales.notifications", "sales.exchange", "sales.created")
    }

    #[tokio::test]
    async fn test_publish_is_persistent_json_on_bound_route() {
        let broker = InMemoryBroker::new();
        let publisher = Publisher::new(broker.clone(), topology());

        publisher
            .publish(&json!({ "orderId": "o-1", "items": [] }))
            .await
            .unwrap();

        let published = broker.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].exchange, "sales.exchange");
        assert_eq!(published[0].routing_key, "sales.created");
        assert_eq!(published[0].properties.content_type, "application/json");
        assert!(published[0].properties.persistent);
        assert_eq!(broker.queue_depth("sales.notifications"), 1);
        assert_eq!(publisher.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_topology_declared_before_first_publish() {
        let broker = InMemoryBroker::new();
        let publisher = Publisher::new(broker.clone(), topology());
        assert!(broker.declared_topologies().is_empty());

        publisher.publish(&json!({})).await.unwrap();

        assert_eq!(broker.declared_topologies(), vec![topology()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_then_success_waits_two_four_eight() {
        let broker = InMemoryBroker::new();
        broker.fail_next_publishes(3);
        let publisher = Publisher::new(broker.clone(), topology());

        let started = Instant::now();
        publisher.publish(&json!({ "orderId": "o-2" })).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(2 + 4 + 8));
        assert_eq!(broker.published().len(), 1);
        assert_eq!(broker.publish_attempt_times().len(), 4);

        let attempts = broker.publish_attempt_times();
        let waits: Vec<Duration> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            waits,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_on_all_attempts_propagates() {
        let broker = InMemoryBroker::new();
        broker.fail_next_publishes(4);
        let publisher = Publisher::new(broker.clone(), topology());

        let err = publisher.publish(&json!({})).await.unwrap_err();

        assert!(matches!(err, BrokerError::RetriesExhausted { attempts: 4, .. }));
        assert!(broker.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_failures_count_as_attempts() {
        let broker = InMemoryBroker::new();
        broker.fail_next_connects(2);
        let publisher = Publisher::new(broker.clone(), topology());

        let started = Instant::now();
        publisher.publish(&json!({})).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(2 + 4));
        assert_eq!(broker.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_connection_loss() {
        let broker = InMemoryBroker::new();
        let publisher =
            Publisher::new(broker.clone(), topology()).with_retry_policy(RetryPolicy::none());

        publisher.publish(&json!({ "n": 1 })).await.unwrap();
        broker.drop_connections();
        publisher.publish(&json!({ "n": 2 })).await.unwrap();

        assert_eq!(broker.connect_count(), 2);
        assert_eq!(broker.declared_topologies().len(), 2);
        assert_eq!(broker.published().len(), 2);
    }

    #[tokio::test]
    async fn test_close_disposes_and_rejects_later_publishes() {
        let broker = InMemoryBroker::new();
        let publisher = Publisher::new(broker.clone(), topology());
        publisher.publish(&json!({})).await.unwrap();

        publisher.close().await.unwrap();

        assert_eq!(
            broker.close_events(),
            vec![CloseEvent::Channel, CloseEvent::Connection]
        );
        assert!(matches!(
            publisher.publish(&json!({})).await,
            Err(BrokerError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_backoff_stops_retrying() {
        let broker = InMemoryBroker::new();
        broker.fail_next_publishes(4);
        let publisher = Arc::new(Publisher::new(broker.clone(), topology()));

        let closer = publisher.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            closer.close().await.unwrap();
        });

        let started = Instant::now();
        let err = publisher.publish(&json!({})).await.unwrap_err();

        assert!(matches!(err, BrokerError::Closed));
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(broker.publish_attempt_times().len(), 1);
    }

    #[tokio::test]
    async fn test_close_before_first_publish() {
        let broker = InMemoryBroker::new();
        let publisher = Publisher::new(broker.clone(), topology());

        publisher.close().await.unwrap();

        assert_eq!(broker.connect_count(), 0);
        assert_eq!(publisher.state(), ConnectionState::Closed);
    }
}
