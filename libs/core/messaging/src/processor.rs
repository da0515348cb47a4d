//! Processor trait applied to each decoded message.

use crate::error::ProcessingError;
use crate::message::Message;
use async_trait::async_trait;

/// Applies the effects of one decoded message.
///
/// The consumer acknowledges the delivery when `process` returns `Ok` and
/// rejects it without requeue on `Err`.
///
/// # Example
///
/// ```rust,ignore
/// struct SaleProcessor { ledger: Arc<dyn StockLedger> }
///
/// #[async_trait]
/// impl Processor<SaleNotification> for SaleProcessor {
///     async fn process(&self, sale: &SaleNotification) -> Result<(), ProcessingError> {
///         for item in &sale.items {
///             self.ledger.decrement(item.product_id, item.quantity).await
///                 .map_err(|e| ProcessingError::fault_with_source("decrement failed", e))?;
///         }
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str { "sale_processor" }
/// }
/// ```
#[async_trait]
pub trait Processor<M: Message>: Send + Sync {
    async fn process(&self, message: &M) -> Result<(), ProcessingError>;

    /// Used for logging and metrics labels.
    fn name(&self) -> &'static str;
}

/// Accepts everything.
#[derive(Debug, Clone, Default)]
pub struct NoOpProcessor;

#[async_trait]
impl<M: Message> Processor<M> for NoOpProcessor {
    async fn process(&self, _message: &M) -> Result<(), ProcessingError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop_processor"
    }
}

/// Fails every message with a fault.
#[derive(Debug, Clone)]
pub struct FailingProcessor {
    error_message: String,
}

impl FailingProcessor {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
        }
    }
}

#[async_trait]
impl<M: Message> Processor<M> for FailingProcessor {
    async fn process(&self, _message: &M) -> Result<(), ProcessingError> {
        Err(ProcessingError::fault(&self.error_message))
    }

    fn name(&self) -> &'static str {
        "failing_processor"
    }
}
