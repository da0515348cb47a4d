use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{StockError, StockResult};
use crate::models::Product;

/// Stock ledger: product lookups and conditional decrements.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Subtract `quantity` from the product's stock if at least that much is on hand.
    ///
    /// Returns the number of rows changed: `1` when applied, `0` when the
    /// product is unknown or its stock is too low. Stock never goes negative.
    async fn decrement(&self, product_id: Uuid, quantity: i32) -> StockResult<u64>;

    async fn get_product(&self, id: Uuid) -> StockResult<Option<Product>>;
}

pub(crate) fn ensure_positive(quantity: i32) -> StockResult<()> {
    if quantity <= 0 {
        return Err(StockError::InvalidQuantity(quantity));
    }
    Ok(())
}

/// In-memory ledger (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryStockLedger {
    products: Arc<RwLock<HashMap<Uuid, Product>>>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }

    /// Current stock of a product, `None` if unknown.
    pub async fn stock_of(&self, id: Uuid) -> Option<i32> {
        self.products.read().await.get(&id).map(|p| p.stock_quantity)
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn decrement(&self, product_id: Uuid, quantity: i32) -> StockResult<u64> {
        ensure_positive(quantity)?;

        // Check and subtract under the same write lock.
        let mut products = self.products.write().await;
        match products.get_mut(&product_id) {
            Some(product) if product.stock_quantity >= quantity => {
                product.stock_quantity -= quantity;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn get_product(&self, id: Uuid) -> StockResult<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }
}
