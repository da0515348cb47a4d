//! Sale consumer: flow-controlled, manually acknowledged, reconnecting.

use crate::broker::{BrokerSession, Connector, Delivery, DeliveryStream};
use crate::connection::ConnectionManager;
use crate::error::BrokerResult;
use crate::message::Message;
use crate::metrics::{BrokerMetrics, OUTCOME_DISCARDED, OUTCOME_PROCESSED};
use crate::processor::Processor;
use crate::topology::Topology;
use core_config::broker::BrokerConfig;
use futures::StreamExt;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Why a delivery is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckReason {
    /// Decoded and processed
    Processed,
    /// Undecodable; dropped so it cannot loop forever
    Discarded,
}

/// What to do with one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Ack(AckReason),
    /// Negative-acknowledge without requeue
    Reject,
}

/// Decode `payload` and run it through `processor`.
///
/// Malformed payloads are acknowledged (discarded); processing errors are
/// rejected without requeue. Settling the delivery is left to the caller.
pub async fn decide<M, P>(payload: &[u8], processor: &P) -> Decision
where
    M: Message,
    P: Processor<M> + ?Sized,
{
    let message: M = match serde_json::from_slice(payload) {
        Ok(message) => message,
        Err(e) => {
            warn!(
                processor = processor.name(),
                error = %e,
                bytes = payload.len(),
                "Malformed message discarded"
            );
            return Decision::Ack(AckReason::Discarded);
        }
    };

    match processor.process(&message).await {
        Ok(()) => Decision::Ack(AckReason::Processed),
        Err(e) => {
            error!(
                processor = processor.name(),
                message_id = %message.message_id(),
                error = %e,
                "Error processing message"
            );
            Decision::Reject
        }
    }
}

/// Lifecycle of the consumer.
///
/// `Uninitialized → Connected → Consuming → (Degraded → Connected → Consuming)* → Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConsumerState {
    Uninitialized,
    Connected,
    Consuming,
    Degraded,
    Stopped,
}

impl ConsumerState {
    /// Whether the consumer is able to take deliveries (or about to).
    pub fn is_ready(&self) -> bool {
        matches!(self, ConsumerState::Connected | ConsumerState::Consuming)
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub queue: String,
    pub consumer_tag: String,
    /// Maximum unacknowledged deliveries held at once
    pub prefetch_count: u16,
    /// Wait before reconnecting after the delivery stream ends
    pub reconnect_delay: Duration,
}

impl ConsumerConfig {
    pub fn from_broker_config(config: &BrokerConfig) -> Self {
        Self {
            queue: config.queue.clone(),
            consumer_tag: format!("{}-{}", config.connection_name, uuid::Uuid::new_v4()),
            prefetch_count: config.prefetch_count,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Long-running consumer applying a [`Processor`] to every delivery.
pub struct ConsumerWorker<M, P, C: Connector> {
    connection: ConnectionManager<C>,
    processor: Arc<P>,
    config: ConsumerConfig,
    metrics: BrokerMetrics,
    state: watch::Sender<ConsumerState>,
    _marker: PhantomData<fn() -> M>,
}

impl<M, P, C> ConsumerWorker<M, P, C>
where
    M: Message,
    P: Processor<M> + 'static,
    C: Connector,
{
    pub fn new(connector: C, topology: Topology, processor: P, config: ConsumerConfig) -> Self {
        let (state, _) = watch::channel(ConsumerState::Uninitialized);
        Self {
            connection: ConnectionManager::new(connector, topology),
            processor: Arc::new(processor),
            metrics: BrokerMetrics::new(&config.queue),
            config,
            state,
            _marker: PhantomData,
        }
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Consume until `shutdown` becomes `true` (or its sender is dropped).
    ///
    /// Deliveries already handed to a handler finish and are settled
    /// before the connection is closed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> BrokerResult<()> {
        info!(
            queue = %self.config.queue,
            consumer_tag = %self.config.consumer_tag,
            prefetch = self.config.prefetch_count,
            processor = self.processor.name(),
            "Starting consumer"
        );

        let mut in_flight = JoinSet::new();

        'consume: loop {
            if *shutdown.borrow() {
                break;
            }

            let mut deliveries = match self.start_consuming().await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = %e, "Failed to start consuming");
                    self.connection.invalidate().await;
                    self.transition(ConsumerState::Degraded);
                    if self.wait_before_reconnect(&mut shutdown).await {
                        continue;
                    }
                    break;
                }
            };

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Shutdown signal received, stopping consumer");
                            break 'consume;
                        }
                    }

                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(e) = joined {
                            error!(error = %e, "Delivery handler panicked");
                        }
                    }

                    next = deliveries.next() => match next {
                        Some(Ok(delivery)) => {
                            let processor = self.processor.clone();
                            let metrics = self.metrics.clone();
                            in_flight.spawn(async move {
                                handle_delivery::<M, P>(delivery, processor.as_ref(), &metrics).await;
                            });
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Delivery stream failed");
                            break;
                        }
                        None => {
                            warn!("Delivery stream ended");
                            break;
                        }
                    },
                }
            }

            drop(deliveries);
            self.connection.invalidate().await;
            self.transition(ConsumerState::Degraded);

            if !self.wait_before_reconnect(&mut shutdown).await {
                break;
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Delivery handler panicked");
            }
        }

        if let Err(e) = self.connection.close().await {
            warn!(error = %e, "Error closing consumer connection");
        }
        self.transition(ConsumerState::Stopped);
        info!("Consumer stopped");
        Ok(())
    }

    async fn start_consuming(&self) -> BrokerResult<DeliveryStream> {
        let session = self.connection.session().await?;
        self.transition(ConsumerState::Connected);

        session.set_prefetch(self.config.prefetch_count).await?;
        let stream = session
            .consume(&self.config.queue, &self.config.consumer_tag)
            .await?;

        self.transition(ConsumerState::Consuming);
        Ok(stream)
    }

    /// Returns `false` when shutdown was requested during the wait.
    async fn wait_before_reconnect(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return false;
        }

        info!(
            delay_ms = self.config.reconnect_delay.as_millis() as u64,
            "Reconnecting consumer after delay"
        );

        tokio::select! {
            _ = tokio::time::sleep(self.config.reconnect_delay) => true,
            changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
        }
    }

    fn transition(&self, next: ConsumerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "Consumer state changed");
        }
    }
}

async fn handle_delivery<M, P>(delivery: Delivery, processor: &P, metrics: &BrokerMetrics)
where
    M: Message,
    P: Processor<M>,
{
    metrics.received();

    if delivery.redelivered {
        debug!(delivery_tag = delivery.delivery_tag, "Processing redelivered message");
    }

    let decision = decide::<M, P>(&delivery.payload, processor).await;

    let settled = match decision {
        Decision::Ack(reason) => {
            let result = delivery.ack().await;
            if result.is_ok() {
                metrics.acked(match reason {
                    AckReason::Processed => OUTCOME_PROCESSED,
                    AckReason::Discarded => OUTCOME_DISCARDED,
                });
            }
            result
        }
        Decision::Reject => {
            let result = delivery.reject().await;
            if result.is_ok() {
                metrics.nacked();
            }
            result
        }
    };

    if let Err(e) = settled {
        warn!(
            delivery_tag = delivery.delivery_tag,
            decision = ?decision,
            error = %e,
            "Failed to settle delivery"
        );
    }
}
