use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{OrderError, OrderResult};
use crate::events::SaleNotification;
use crate::models::{CreateOrder, CreateOrderItem, EMPTY_ORDER_MESSAGE, Order, OrderLine, Shortfall};
use crate::notifier::SaleNotifier;
use crate::repository::OrderRepository;
use crate::stock_query::StockQuery;

/// Order intake: validate, check stock, persist, then notify.
pub struct OrderService<R, Q, N> {
    repository: Arc<R>,
    stock: Arc<Q>,
    notifier: Arc<N>,
}

impl<R, Q, N> Clone for OrderService<R, Q, N> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            stock: self.stock.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<R, Q, N> OrderService<R, Q, N>
where
    R: OrderRepository,
    Q: StockQuery,
    N: SaleNotifier,
{
    pub fn new(repository: R, stock: Q, notifier: N) -> Self {
        Self::from_shared(Arc::new(repository), Arc::new(stock), Arc::new(notifier))
    }

    /// Build from handles the caller keeps too (e.g. the publisher it closes on shutdown).
    pub fn from_shared(repository: Arc<R>, stock: Arc<Q>, notifier: Arc<N>) -> Self {
        Self {
            repository,
            stock,
            notifier,
        }
    }

    /// Create a confirmed order.
    ///
    /// Stock is queried item by item with the caller's `credential`. The first
    /// upstream failure aborts the request; otherwise every shortfall is
    /// collected and reported together. Nothing is persisted unless all items
    /// are available. The sale notification is best-effort: a publish failure
    /// is logged and the committed order is still returned.
    ///
    /// Flipping `cancel` to `true` aborts outstanding stock queries and the
    /// publish attempt.
    pub async fn create_order(
        &self,
        input: CreateOrder,
        credential: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> OrderResult<Order> {
        if input.items.is_empty() {
            return Err(OrderError::Validation(EMPTY_ORDER_MESSAGE.to_string()));
        }
        input
            .validate()
            .map_err(|e| OrderError::Validation(e.to_string()))?;

        let lines = until_cancelled(&mut cancel, self.price_lines(&input.items, credential))
            .await
            .ok_or(OrderError::Cancelled)??;

        let order = self
            .repository
            .create(Order::confirmed(input.customer_id, lines))
            .await?;
        info!(
            order_id = %order.id,
            items = order.items.len(),
            total = %order.total(),
            "Order created"
        );

        self.emit_sale(&order, &mut cancel).await;

        Ok(order)
    }

    pub async fn get_order(&self, id: Uuid) -> OrderResult<Order> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or(OrderError::NotFound(id))
    }

    /// Query every item in request order, capturing the current unit price.
    async fn price_lines(
        &self,
        items: &[CreateOrderItem],
        credential: &str,
    ) -> OrderResult<Vec<OrderLine>> {
        let mut lines = Vec::with_capacity(items.len());
        let mut shortfalls = Vec::new();

        for item in items {
            let stock = self.stock.availability(item.product_id, credential).await?;

            if stock.available < item.quantity {
                shortfalls.push(Shortfall {
                    product_id: item.product_id,
                    available: stock.available,
                    requested: item.quantity,
                });
                continue;
            }

            lines.push(OrderLine {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: stock.unit_price,
            });
        }

        if !shortfalls.is_empty() {
            info!(shortfalls = shortfalls.len(), "Order rejected for insufficient stock");
            return Err(OrderError::InsufficientStock(shortfalls));
        }
        Ok(lines)
    }

    async fn emit_sale(&self, order: &Order, cancel: &mut watch::Receiver<bool>) {
        let sale = SaleNotification::from(order);

        match until_cancelled(cancel, self.notifier.notify(&sale)).await {
            Some(Ok(())) => {
                info!(
                    order_id = %order.id,
                    items = sale.items.len(),
                    "Sale notification published"
                );
            }
            Some(Err(e)) => {
                error!(
                    order_id = %order.id,
                    error = %e,
                    "Failed to publish sale notification; order stays committed"
                );
            }
            None => {
                warn!(order_id = %order.id, "Sale notification cancelled; order stays committed");
            }
        }
    }
}

/// `None` if `cancel` flips to `true` before `fut` completes.
///
/// A dropped sender never cancels.
async fn until_cancelled<F: Future>(
    cancel: &mut watch::Receiver<bool>,
    fut: F,
) -> Option<F::Output> {
    let cancelled = async {
        if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        biased;
        _ = cancelled => None,
        output = fut => Some(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StockAvailability;
    use crate::notifier::MockSaleNotifier;
    use crate::repository::{InMemoryOrderRepository, MockOrderRepository};
    use crate::stock_query::MockStockQuery;
    use messaging::memory::InMemoryBroker;
    use messaging::{BrokerError, Publisher, Topology};
    use mockall::predicate::eq;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    const TOKEN: &str = "caller-token";

    fn item(quantity: i32) -> CreateOrderItem {
        CreateOrderItem {
            product_id: Uuid::now_v7(),
            quantity,
        }
    }

    fn order_input(items: Vec<CreateOrderItem>) -> CreateOrder {
        CreateOrder {
            customer_id: Some("customer-42".into()),
            items,
        }
    }

    fn no_cancel() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    fn in_stock(available: i32, price: rust_decimal::Decimal) -> StockAvailability {
        StockAvailability {
            available,
            unit_price: price,
        }
    }

    fn notifier_ok() -> MockSaleNotifier {
        let mut notifier = MockSaleNotifier::new();
        notifier.expect_notify().returning(|_| Ok(()));
        notifier
    }

    #[tokio::test]
    async fn test_empty_order_fails_before_any_stock_query() {
        let mut stock = MockStockQuery::new();
        stock.expect_availability().never();
        let mut repo = MockOrderRepository::new();
        repo.expect_create().never();
        let mut notifier = MockSaleNotifier::new();
        notifier.expect_notify().never();

        let service = OrderService::new(repo, stock, notifier);
        let result = service
            .create_order(order_input(vec![]), TOKEN, no_cancel())
            .await;

        match result {
            Err(OrderError::Validation(msg)) => assert_eq!(msg, EMPTY_ORDER_MESSAGE),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_positive_quantity_fails_before_any_stock_query() {
        let mut stock = MockStockQuery::new();
        stock.expect_availability().never();

        let service = OrderService::new(MockOrderRepository::new(), stock, MockSaleNotifier::new());
        let result = service
            .create_order(order_input(vec![item(0)]), TOKEN, no_cancel())
            .await;

        assert!(matches!(result, Err(OrderError::Validation(_))));
    }

    #[tokio::test]
    async fn test_confirmed_order_uses_queried_prices() {
        let first = item(3);
        let second = item(1);

        let mut stock = MockStockQuery::new();
        stock
            .expect_availability()
            .with(eq(first.product_id), eq(TOKEN))
            .times(1)
            .returning(|_, _| Ok(in_stock(10, dec!(19.99))));
        stock
            .expect_availability()
            .with(eq(second.product_id), eq(TOKEN))
            .times(1)
            .returning(|_, _| Ok(in_stock(1, dec!(5.00))));

        let repo = InMemoryOrderRepository::new();
        let service = OrderService::new(repo.clone(), stock, notifier_ok());

        let order = service
            .create_order(order_input(vec![first.clone(), second]), TOKEN, no_cancel())
            .await
            .unwrap();

        assert_eq!(order.status, crate::models::OrderStatus::Confirmed);
        assert_eq!(order.items[0].product_id, first.product_id);
        assert_eq!(order.items[0].unit_price, dec!(19.99));
        assert_eq!(order.total(), dec!(64.97));
        assert_eq!(service.get_order(order.id).await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_all_shortfalls_are_reported_and_nothing_persisted() {
        let mut stock = MockStockQuery::new();
        let mut answers = vec![
            in_stock(0, dec!(1.00)),
            in_stock(5, dec!(2.00)),
            in_stock(1, dec!(3.00)),
        ]
        .into_iter();
        stock
            .expect_availability()
            .times(3)
            .returning(move |_, _| Ok(answers.next().unwrap()));

        let mut repo = MockOrderRepository::new();
        repo.expect_create().never();
        let mut notifier = MockSaleNotifier::new();
        notifier.expect_notify().never();

        let service = OrderService::new(repo, stock, notifier);
        let items = vec![item(2), item(2), item(2)];
        let result = service
            .create_order(order_input(items.clone()), TOKEN, no_cancel())
            .await;

        match result {
            Err(OrderError::InsufficientStock(shortfalls)) => {
                assert_eq!(shortfalls.len(), 2);
                assert_eq!(shortfalls[0].product_id, items[0].product_id);
                assert_eq!(shortfalls[0].available, 0);
                assert_eq!(shortfalls[1].product_id, items[2].product_id);
                assert_eq!(shortfalls[1].requested, 2);
            }
            other => panic!("expected insufficient stock, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_upstream_failure_aborts() {
        let mut stock = MockStockQuery::new();
        stock
            .expect_availability()
            .times(1)
            .returning(|_, _| Err(OrderError::UpstreamUnavailable("503".into())));

        let mut repo = MockOrderRepository::new();
        repo.expect_create().never();

        let service = OrderService::new(repo, stock, MockSaleNotifier::new());
        let result = service
            .create_order(order_input(vec![item(1), item(1)]), TOKEN, no_cancel())
            .await;

        assert!(matches!(result, Err(OrderError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_order() {
        let mut stock = MockStockQuery::new();
        stock
            .expect_availability()
            .returning(|_, _| Ok(in_stock(10, dec!(2.00))));
        let mut notifier = MockSaleNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .returning(|_| Err(BrokerError::Connection("broker down".into())));

        let repo = InMemoryOrderRepository::new();
        let service = OrderService::new(repo.clone(), stock, notifier);

        let order = service
            .create_order(order_input(vec![item(2)]), TOKEN, no_cancel())
            .await
            .unwrap();

        assert_eq!(repo.count().await, 1);
        assert_eq!(service.get_order(order.id).await.unwrap().total(), dec!(4.00));
    }

    #[tokio::test]
    async fn test_notification_carries_order_lines() {
        let requested = item(4);
        let product_id = requested.product_id;

        let mut stock = MockStockQuery::new();
        stock
            .expect_availability()
            .returning(|_, _| Ok(in_stock(4, dec!(1.00))));
        let mut notifier = MockSaleNotifier::new();
        notifier
            .expect_notify()
            .withf(move |sale| {
                sale.items.len() == 1
                    && sale.items[0].product_id == product_id
                    && sale.items[0].quantity == 4
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = OrderService::new(InMemoryOrderRepository::new(), stock, notifier);
        let order = service
            .create_order(order_input(vec![requested]), TOKEN, no_cancel())
            .await
            .unwrap();

        assert_eq!(order.items.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_publisher_does_not_affect_committed_order() {
        let broker = InMemoryBroker::new();
        broker.fail_next_publishes(4);
        let publisher = Publisher::new(
            broker.clone(),
            Topology::new("sales.notifications", "sales.exchange", "sales.created"),
        );

        let mut stock = MockStockQuery::new();
        stock
            .expect_availability()
            .returning(|_, _| Ok(in_stock(3, dec!(7.00))));

        let repo = InMemoryOrderRepository::new();
        let service = OrderService::new(repo.clone(), stock, publisher);
        let started = tokio::time::Instant::now();

        let order = service
            .create_order(order_input(vec![item(3)]), TOKEN, no_cancel())
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(2 + 4 + 8));
        assert!(broker.published().is_empty());
        assert_eq!(service.get_order(order.id).await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_cancel_aborts_stock_queries() {
        let mut stock = MockStockQuery::new();
        stock.expect_availability().returning(|_, _| {
            Err(OrderError::Internal("should not be reached".into()))
        });
        let mut repo = MockOrderRepository::new();
        repo.expect_create().never();

        let (tx, rx) = watch::channel(false);
        tx.send_replace(true);

        let service = OrderService::new(repo, stock, MockSaleNotifier::new());
        let result = service.create_order(order_input(vec![item(1)]), TOKEN, rx).await;

        assert!(matches!(result, Err(OrderError::Cancelled)));
    }

    /// Stock service that takes a minute to answer.
    struct SlowStockQuery;

    #[async_trait::async_trait]
    impl StockQuery for SlowStockQuery {
        async fn availability(
            &self,
            _product_id: Uuid,
            _credential: &str,
        ) -> OrderResult<StockAvailability> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(in_stock(100, dec!(1.00)))
        }
    }

    fn cancel_after(delay: Duration) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tx.send_replace(true);
        });
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_stock_query_pending() {
        let repo = InMemoryOrderRepository::new();
        let mut notifier = MockSaleNotifier::new();
        notifier.expect_notify().never();
        let service = OrderService::new(repo.clone(), SlowStockQuery, notifier);
        let started = tokio::time::Instant::now();

        let result = service
            .create_order(
                order_input(vec![item(1), item(2)]),
                TOKEN,
                cancel_after(Duration::from_secs(1)),
            )
            .await;

        assert!(matches!(result, Err(OrderError::Cancelled)));
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(repo.count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_publish_backoff_keeps_order() {
        let broker = InMemoryBroker::new();
        broker.fail_next_publishes(4);
        let publisher = Publisher::new(
            broker.clone(),
            Topology::new("sales.notifications", "sales.exchange", "sales.created"),
        );

        let mut stock = MockStockQuery::new();
        stock
            .expect_availability()
            .returning(|_, _| Ok(in_stock(5, dec!(2.50))));

        let repo = InMemoryOrderRepository::new();
        let service = OrderService::new(repo.clone(), stock, publisher);
        let started = tokio::time::Instant::now();

        // First retry waits 2s, the second 4s: cancel lands inside the second wait.
        let order = service
            .create_order(
                order_input(vec![item(2)]),
                TOKEN,
                cancel_after(Duration::from_secs(3)),
            )
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(repo.count().await, 1);
        assert!(broker.published().is_empty());
        assert_eq!(service.get_order(order.id).await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_dropped_cancel_sender_never_cancels() {
        let mut stock = MockStockQuery::new();
        stock
            .expect_availability()
            .returning(|_, _| Ok(in_stock(1, dec!(1.00))));

        let (tx, rx) = watch::channel(false);
        drop(tx);

        let service = OrderService::new(InMemoryOrderRepository::new(), stock, notifier_ok());
        let result = service.create_order(order_input(vec![item(1)]), TOKEN, rx).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_get_unknown_order_is_not_found() {
        let service = OrderService::new(
            InMemoryOrderRepository::new(),
            MockStockQuery::new(),
            MockSaleNotifier::new(),
        );
        let id = Uuid::now_v7();

        assert!(matches!(
            service.get_order(id).await,
            Err(OrderError::NotFound(missing)) if missing == id
        ));
    }
}
