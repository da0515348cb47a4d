//! Sales API
//!
//! Accepts orders over HTTP, checks stock with the stock service, persists
//! confirmed orders and announces each one on the broker.
//!
//! ```text
//! POST /api/orders ─▶ OrderService ─▶ GET stock-worker /api/products/{id}
//!                          │
//!                          ├─▶ PostgreSQL (orders, order_items)
//!                          └─▶ Publisher ─▶ sales.exchange ─▶ sales.notifications
//! ```

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
use domain_sales::{
    ApiDoc, HttpStockQuery, OrderRepository, OrderService, PgOrderRepository, SaleNotifier,
    StockQuery, handlers,
};
use eyre::{Result, WrapErr};
use messaging::{Publisher, Topology, amqp::AmqpConnector};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use config::Config;

/// Compose the HTTP surface: `/api/orders`, docs, `/health` and `/ready`.
pub fn app<R, Q, N>(
    service: OrderService<R, Q, N>,
    shutdown: watch::Receiver<bool>,
    db: DatabaseConnection,
    app_info: AppInfo,
) -> Result<Router>
where
    R: OrderRepository + 'static,
    Q: StockQuery + 'static,
    N: SaleNotifier + 'static,
{
    let api_routes = Router::new().nest("/orders", handlers::router(service, shutdown));

    let router = create_router::<ApiDoc>(api_routes).wrap_err("Failed to build router")?;

    Ok(router.merge(health_router(app_info)).merge(ready_router(db)))
}

fn ready_router(db: DatabaseConnection) -> Router {
    Router::new()
        .route("/ready", get(ready_handler))
        .with_state(db)
}

async fn ready_handler(State(db): State<DatabaseConnection>) -> impl IntoResponse {
    let checks: Vec<(&str, HealthCheckFuture)> = vec![(
        "database",
        Box::pin(async { check_health(&db).await.map_err(|e| e.to_string()) }),
    )];
    run_health_checks(checks).await
}

/// Run the sales API until SIGINT/SIGTERM.
///
/// # Errors
///
/// Returns an error if configuration is invalid, PostgreSQL is unreachable,
/// migrations fail or the HTTP server cannot bind.
pub async fn run() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env().wrap_err("Failed to load configuration")?;
    init_tracing(&config.environment);

    info!(name = %config.app.name, version = %config.app.version, "Starting sales API");

    let db = connect_from_config_with_retry(config.database.clone(), None)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;

    if config.run_migrations {
        run_migrations::<migration::SalesMigrator>(&db, config.app.name)
            .await
            .wrap_err("Failed to run migrations")?;
    }

    // Connects lazily on the first publish.
    let publisher = Arc::new(Publisher::new(
        AmqpConnector::from_config(&config.broker),
        Topology::from_config(&config.broker),
    ));
    let stock = HttpStockQuery::new(&config.stock_service)
        .wrap_err("Failed to build stock service client")?;

    let service = OrderService::from_shared(
        Arc::new(PgOrderRepository::new(db.clone())),
        Arc::new(stock),
        publisher.clone(),
    );

    let shutdown = ShutdownCoordinator::new();
    let router = app(service, shutdown.subscribe(), db.clone(), config.app.clone())?;

    let signals = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.wait_for_signal().await })
    };

    serve(router, &config.server, shutdown.wait())
        .await
        .wrap_err("Server error")?;
    signals.abort();
    shutdown.shutdown();

    info!("Shutting down: closing broker and database connections");
    if let Err(e) = publisher.close().await {
        error!(error = %e, "Error closing publisher");
    }
    match db.close().await {
        Ok(()) => info!("PostgreSQL connection closed successfully"),
        Err(e) => error!("Error closing PostgreSQL: {}", e),
    }

    info!("Sales API shutdown complete");
    Ok(())
}
