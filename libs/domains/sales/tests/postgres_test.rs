//! Order persistence against a real PostgreSQL (requires Docker).

use domain_sales::{Order, OrderLine, OrderRepository, PgOrderRepository};
use rust_decimal_macros::dec;
use test_utils::{TestDataBuilder, TestDatabase};

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_order_round_trips_with_lines() {
    let db = TestDatabase::new().await;
    let data = TestDataBuilder::from_test_name("test_order_round_trips_with_lines");
    let repo = PgOrderRepository::new(db.connection());

    let order = Order::confirmed(
        Some("customer-42".into()),
        vec![
            OrderLine {
                product_id: data.product_id(0),
                quantity: 2,
                unit_price: dec!(49.90),
            },
            OrderLine {
                product_id: data.product_id(1),
                quantity: 1,
                unit_price: dec!(19.99),
            },
        ],
    );

    repo.create(order.clone()).await.unwrap();
    let stored = repo.get_by_id(order.id).await.unwrap().unwrap();

    assert_eq!(stored, order);
    assert_eq!(stored.total(), dec!(119.79));
}
