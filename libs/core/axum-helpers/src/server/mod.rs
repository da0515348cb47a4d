//! Server infrastructure module.
//!
//! - Router setup with OpenAPI documentation, tracing and optional CORS
//! - Health and readiness endpoints
//! - Graceful shutdown coordination
//!
//! # Example
//!
//! ```ignore
//! use axum_helpers::server::{create_router, health_router, serve, ShutdownCoordinator};
//! use core_config::app_info;
//!
//! let router = create_router::<ApiDoc>(api_routes)?.merge(health_router(app_info!()));
//!
//! let shutdown = ShutdownCoordinator::new();
//! tokio::spawn({
//!     let shutdown = shutdown.clone();
//!     async move { shutdown.wait_for_signal().await }
//! });
//! serve(router, &ServerConfig::default(), async move { shutdown.wait().await }).await?;
//! ```

pub mod app;
pub mod cors;
pub mod health;
pub mod shutdown;

pub use app::{create_app, create_router, serve};
pub use cors::cors_layer_from_env;
pub use health::{HealthCheckFuture, HealthResponse, health_router, run_health_checks};
pub use shutdown::{ShutdownCoordinator, shutdown_signal};
