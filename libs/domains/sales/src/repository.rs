use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::OrderResult;
use crate::models::Order;

/// Repository trait for Order persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist the order and all its lines atomically
    async fn create(&self, order: Order) -> OrderResult<Order>;

    async fn get_by_id(&self, id: Uuid) -> OrderResult<Option<Order>>;
}

/// In-memory implementation of OrderRepository (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: Order) -> OrderResult<Order> {
        self.orders.write().await.insert(order.id, order.clone());
        tracing::debug!(order_id = %order.id, "Stored order in memory");
        Ok(order)
    }

    async fn get_by_id(&self, id: Uuid) -> OrderResult<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }
}
