//! Stock Worker
//!
//! Drains the sale-notification queue into the stock ledger and serves the
//! product lookups order intake depends on.
//!
//! ## Architecture
//!
//! ```text
//! sales.notifications (prefetch-bounded, manual ack)
//!   ↓
//! ConsumerWorker<SaleNotification, SaleProcessor>
//!   ↓ (one conditional UPDATE per line)
//! PostgreSQL products
//!   ↑
//! GET /api/products/{id}
//! ```
//!
//! The same HTTP port serves `/health`, `/ready` and `/metrics`.

pub mod config;

use axum::{Router, extract::State, response::IntoResponse, routing::get};
use axum_helpers::{
    HealthCheckFuture, ShutdownCoordinator, create_router, health_router, run_health_checks,
    serve,
};
use core_config::{AppInfo, tracing::init_tracing, tracing::install_color_eyre};
use database::postgres::{
    DatabaseConnection, check_health, connect_from_config_with_retry, run_migrations,
};
use domain_stock::{ApiDoc, PgStockLedger, SaleNotification, SaleProcessor, StockLedger, handlers};
use eyre::{Result, WrapErr};
use messaging::metrics::{init_metrics, metrics_router};
use messaging::{ConsumerConfig, ConsumerState, ConsumerWorker, Topology, amqp::AmqpConnector};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use config::Config;

#[derive(Clone)]
struct ReadyState {
    db: DatabaseConnection,
    consumer: watch::Receiver<ConsumerState>,
}

/// Compose the HTTP surface: `/api/products`, docs, `/health` and `/ready`.
///
/// `/metrics` is merged by [`run`] once the Prometheus recorder is installed.
pub fn app<L: StockLedger + 'static>(
    ledger: Arc<L>,
    db: DatabaseConnection,
    consumer: watch::Receiver<ConsumerState>,
    app_info: AppInfo,
) -> Result<Router> {
    let api_routes = Router::new().nest("/products", handlers::router(ledger));

    let router = create_router::<ApiDoc>(api_routes).wrap_err("Failed to build router")?;

    let ready = Router::new()
        .route("/ready", get(ready_handler))
        .with_state(ReadyState { db, consumer });

    Ok(router.merge(health_router(app_info)).merge(ready))
}

async fn ready_handler(State(state): State<ReadyState>) -> impl IntoResponse {
    let consumer = *state.consumer.borrow();
    let checks: Vec<(&str, HealthCheckFuture)> = vec![
        (
            "database",
            Box::pin(async { check_health(&state.db).await.map_err(|e| e.to_string()) }),
        ),
        (
            "consumer",
            Box::pin(async move {
                if consumer.is_ready() {
                    Ok(())
                } else {
                    Err(format!("consumer is {}", consumer))
                }
            }),
        ),
    ];
    run_health_checks(checks).await
}

/// Run the stock worker until SIGINT/SIGTERM.
///
/// # Errors
///
/// Returns an error if configuration is invalid, PostgreSQL is unreachable,
/// migrations fail or the HTTP server cannot bind.
pub async fn run() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env().wrap_err("Failed to load configuration")?;
    init_tracing(&config.environment);

    let metrics = init_metrics().wrap_err("Failed to install Prometheus recorder")?;

    info!(name = %config.app.name, version = %config.app.version, "Starting stock worker");

    let db = connect_from_config_with_retry(config.database.clone(), None)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;

    if config.run_migrations {
        run_migrations::<migration::StockMigrator>(&db, config.app.name)
            .await
            .wrap_err("Failed to run migrations")?;
    }

    let ledger = PgStockLedger::new(db.clone());
    let consumer_config = ConsumerConfig::from_broker_config(&config.broker);
    info!(
        queue = %consumer_config.queue,
        consumer_tag = %consumer_config.consumer_tag,
        prefetch = consumer_config.prefetch_count,
        "Consumer configuration loaded"
    );

    let worker: Arc<ConsumerWorker<SaleNotification, _, _>> = Arc::new(ConsumerWorker::new(
        AmqpConnector::from_config(&config.broker),
        Topology::from_config(&config.broker),
        SaleProcessor::new(ledger.clone()),
        consumer_config,
    ));

    let shutdown = ShutdownCoordinator::new();

    let consumer = {
        let worker = worker.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = worker.run(shutdown.subscribe()).await;
            if let Err(e) = &result {
                error!(error = %e, "Consumer stopped with an error");
            }
            // The process is useless without its consumer.
            shutdown.shutdown();
            result
        })
    };

    let router = app(
        Arc::new(ledger),
        db.clone(),
        worker.subscribe(),
        config.app.clone(),
    )?
    .merge(metrics_router(metrics));

    let signals = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.wait_for_signal().await })
    };

    serve(router, &config.server, shutdown.wait())
        .await
        .wrap_err("Server error")?;
    signals.abort();
    shutdown.shutdown();

    info!("Waiting for the consumer to settle in-flight deliveries");
    match consumer.await {
        Ok(Ok(())) => info!("Consumer stopped"),
        Ok(Err(_)) => {}
        Err(e) => error!(error = %e, "Consumer task panicked"),
    }

    match db.close().await {
        Ok(()) => info!("PostgreSQL connection closed successfully"),
        Err(e) => error!("Error closing PostgreSQL: {}", e),
    }

    info!("Stock worker shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use domain_stock::InMemoryStockLedger;
    use http_body_util::BodyExt;
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase};
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_app(db: DatabaseConnection, consumer: ConsumerState) -> Router {
        let (_tx, rx) = watch::channel(consumer);
        temp_env::with_var_unset("CORS_ALLOWED_ORIGIN", || {
            app(
                Arc::new(InMemoryStockLedger::new()),
                db,
                rx,
                core_config::app_info!(),
            )
            .unwrap()
        })
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_name() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let (status, body) = get(test_app(db, ConsumerState::Consuming), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "stock_worker");
    }

    #[tokio::test]
    async fn test_ready_fails_while_consumer_degraded() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors([DbErr::Custom("connection refused".into())])
            .into_connection();

        let (status, body) = get(test_app(db, ConsumerState::Degraded), "/ready").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["consumer"], "disconnected");
        assert_eq!(body["database"], "disconnected");
    }

    #[tokio::test]
    async fn test_products_are_mounted_under_api() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let uri = format!("/api/products/{}", uuid::Uuid::now_v7());

        let (status, body) = get(test_app(db, ConsumerState::Consuming), &uri).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }
}
