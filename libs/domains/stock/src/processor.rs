use async_trait::async_trait;
use messaging::{ProcessingError, Processor};
use metrics::counter;
use tracing::{info, warn};

use crate::events::SaleNotification;
use crate::ledger::StockLedger;

pub const DECREMENT_MISSES: &str = "stock_decrement_misses_total";

/// Applies a sale notification to the stock ledger, one conditional decrement per line.
///
/// A line that misses (unknown product or too little stock) is logged and
/// skipped; the remaining lines are still applied. A ledger failure aborts the
/// message, and lines already applied stay applied.
pub struct SaleProcessor<L> {
    ledger: L,
}

impl<L: StockLedger> SaleProcessor<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }
}

#[async_trait]
impl<L: StockLedger> Processor<SaleNotification> for SaleProcessor<L> {
    async fn process(&self, sale: &SaleNotification) -> Result<(), ProcessingError> {
        for item in &sale.items {
            if item.quantity <= 0 {
                warn!(
                    order_id = %sale.order_id,
                    product_id = %item.product_id,
                    quantity = item.quantity,
                    "Skipping line with non-positive quantity"
                );
                continue;
            }

            let affected = self
                .ledger
                .decrement(item.product_id, item.quantity)
                .await
                .map_err(|e| ProcessingError::fault_with_source("stock decrement failed", e))?;

            if affected > 0 {
                info!(
                    product_id = %item.product_id,
                    quantity = item.quantity,
                    order_id = %sale.order_id,
                    "Product stock reduced"
                );
            } else {
                counter!(DECREMENT_MISSES).increment(1);
                warn!(
                    product_id = %item.product_id,
                    quantity = item.quantity,
                    order_id = %sale.order_id,
                    "Product not found or insufficient stock"
                );
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "sale_processor"
    }
}
