use async_trait::async_trait;
use messaging::{BrokerResult, Connector, Publisher};

use crate::events::SaleNotification;

/// Emits sale notifications. Failures are reported, never retried here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SaleNotifier: Send + Sync {
    async fn notify(&self, sale: &SaleNotification) -> BrokerResult<()>;
}

#[async_trait]
impl<C: Connector> SaleNotifier for Publisher<C> {
    async fn notify(&self, sale: &SaleNotification) -> BrokerResult<()> {
        self.publish(sale).await
    }
}
