//! Sale consumer wired to the stock ledger over the in-memory broker.

use domain_stock::*;
use messaging::memory::InMemoryBroker;
use messaging::{ConsumerConfig, ConsumerWorker, Topology};
use rust_decimal_macros::dec;
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

const QUEUE: &str = "sales.notifications";

fn worker(
    broker: &InMemoryBroker,
    ledger: InMemoryStockLedger,
) -> ConsumerWorker<SaleNotification, SaleProcessor<InMemoryStockLedger>, InMemoryBroker> {
    ConsumerWorker::new(
        broker.clone(),
        Topology::new(QUEUE, "sales.exchange", "sales.created"),
        SaleProcessor::new(ledger),
        ConsumerConfig {
            queue: QUEUE.to_string(),
            consumer_tag: "stock-consumer-test".to_string(),
            prefetch_count: 10,
            reconnect_delay: Duration::from_millis(10),
        },
    )
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_notifications_reduce_stock_and_are_acked() {
    let broker = InMemoryBroker::new();
    let ledger = InMemoryStockLedger::new();
    let product = Product::new("Keyboard", dec!(49.90), 5);
    let id = product.id;
    ledger.insert(product).await;

    let sale = |quantity: i32| {
        serde_json::to_vec(&json!({
            "orderId": Uuid::now_v7(),
            "items": [{ "productId": id, "quantity": quantity }]
        }))
        .unwrap()
    };
    broker.enqueue(QUEUE, sale(3));
    broker.enqueue(QUEUE, sale(3));
    broker.enqueue(QUEUE, b"not a sale".to_vec());

    let worker = worker(&broker, ledger.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let control = async {
        wait_for(|| broker.acks().len() == 3).await;
        shutdown_tx.send(true).unwrap();
    };
    let (result, _) = tokio::join!(worker.run(shutdown_rx), control);
    result.unwrap();

    // Second sale misses (2 left, 3 requested) and is still acknowledged.
    assert_eq!(ledger.stock_of(id).await, Some(2));
    assert!(broker.nacks().is_empty());
    assert_eq!(broker.queue_depth(QUEUE), 0);
    assert_eq!(broker.prefetch_history(), vec![10]);
}
