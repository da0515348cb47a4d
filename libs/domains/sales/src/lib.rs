//! Sales Domain
//!
//! Order intake for the sale-notification pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  ← POST /orders, GET /orders/{id}
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐     ┌────────────┐
//! │   Service   │────▶│ StockQuery │  ← GET stock service, caller's token
//! └──┬───────┬──┘     └────────────┘
//!    │       │
//!    │  ┌────▼────────┐
//!    │  │ SaleNotifier│  ← messaging::Publisher, best-effort
//!    │  └─────────────┘
//! ┌──▼──────────┐
//! │ Repository  │  ← order + lines in one transaction
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_sales::{handlers, HttpStockQuery, OrderService, PgOrderRepository};
//!
//! let service = OrderService::new(
//!     PgOrderRepository::new(db),
//!     HttpStockQuery::new(&StockServiceConfig::from_env()?)?,
//!     publisher,
//! );
//! let router = Router::new().nest("/orders", handlers::router(service, shutdown_rx));
//! ```

pub mod entity;
pub mod error;
pub mod events;
pub mod handlers;
pub mod models;
pub mod notifier;
pub mod postgres;
pub mod repository;
pub mod service;
pub mod stock_query;

// Re-export commonly used types
pub use error::{OrderError, OrderResult};
pub use events::{SaleItem, SaleNotification};
pub use handlers::ApiDoc;
pub use models::{
    CreateOrder, CreateOrderItem, Order, OrderLine, OrderResponse, OrderStatus, Shortfall,
    StockAvailability,
};
pub use notifier::SaleNotifier;
pub use postgres::PgOrderRepository;
pub use repository::{InMemoryOrderRepository, OrderRepository};
pub use service::OrderService;
pub use stock_query::{HttpStockQuery, StockQuery, StockServiceConfig};
