//! Prometheus metrics for the sale-notification pipeline.

use metrics::counter;

/// Label value for acks of a processed message.
pub const OUTCOME_PROCESSED: &str = "processed";
/// Label value for acks of a discarded (malformed) message.
pub const OUTCOME_DISCARDED: &str = "discarded";

/// Counters recorded by the publisher and the consumer.
#[derive(Debug, Clone)]
pub struct BrokerMetrics {
    queue: String,
}

impl BrokerMetrics {
    pub fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
        }
    }

    pub fn published(&self) {
        counter!(
            "sales_notifications_published_total",
            "queue" => self.queue.clone()
        )
        .increment(1);
    }

    /// Record retries spent on one publish (attempts beyond the first).
    pub fn publish_retries(&self, retries: u32) {
        if retries == 0 {
            return;
        }
        counter!(
            "sales_notifications_publish_retries_total",
            "queue" => self.queue.clone()
        )
        .increment(u64::from(retries));
    }

    pub fn publish_failed(&self) {
        counter!(
            "sales_notifications_publish_failed_total",
            "queue" => self.queue.clone()
        )
        .increment(1);
    }

    pub fn received(&self) {
        counter!(
            "sales_notifications_received_total",
            "queue" => self.queue.clone()
        )
        .increment(1);
    }

    pub fn acked(&self, outcome: &'static str) {
        counter!(
            "sales_notifications_acked_total",
            "queue" => self.queue.clone(),
            "outcome" => outcome
        )
        .increment(1);
    }

    pub fn nacked(&self) {
        counter!(
            "sales_notifications_nacked_total",
            "queue" => self.queue.clone()
        )
        .increment(1);
    }
}

/// Install the global Prometheus recorder.
#[cfg(feature = "prometheus")]
pub fn init_metrics() -> Result<
    metrics_exporter_prometheus::PrometheusHandle,
    metrics_exporter_prometheus::BuildError,
> {
    metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()
}

/// `GET /metrics` rendering the Prometheus text format.
#[cfg(feature = "prometheus")]
pub fn metrics_router(handle: metrics_exporter_prometheus::PrometheusHandle) -> axum::Router {
    axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}
