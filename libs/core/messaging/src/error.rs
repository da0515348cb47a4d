//! Error types for broker plumbing and message processing.

use thiserror::Error;

/// Error raised by the broker layer (connect, declare, publish, consume).
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Could not open a connection or channel
    #[error("connection error: {0}")]
    Connection(String),

    /// Topology declaration was refused by the broker
    #[error("topology declaration failed: {0}")]
    Topology(String),

    /// A publish call failed
    #[error("publish failed: {0}")]
    Publish(String),

    /// Consuming, acking or nacking failed
    #[error("consume failed: {0}")]
    Consume(String),

    /// The message could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The owning component has been disposed
    #[error("broker client is closed")]
    Closed,

    /// Every publish attempt failed
    #[error("publish failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<BrokerError>,
    },

    /// AMQP protocol or I/O error
    #[cfg(feature = "amqp")]
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
}

impl BrokerError {
    /// Whether retrying the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            BrokerError::Serialization(_) | BrokerError::Closed | BrokerError::RetriesExhausted { .. }
        )
    }
}

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Error returned by a [`Processor`](crate::Processor) while applying a message.
///
/// Any processing error leads to the delivery being rejected without
/// requeue.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Unexpected failure while applying effects (storage down, etc.)
    #[error("processing fault: {message}")]
    Fault {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ProcessingError {
    /// Create a fault without an underlying cause.
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault {
            message: message.into(),
            source: None,
        }
    }

    /// Create a fault wrapping an underlying cause.
    pub fn fault_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Fault {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
