//! Stock Domain
//!
//! Product stock levels and the consumer side of the sale-notification pipeline.
//!
//! ```text
//! broker ──▶ ConsumerWorker ──▶ SaleProcessor ──▶ StockLedger::decrement
//!                                                   (UPDATE ... WHERE stock_quantity >= $q)
//! HTTP GET /products/{id} ──────────────────────▶ StockLedger::get_product
//! ```

pub mod entity;
pub mod error;
pub mod events;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod postgres;
pub mod processor;

pub use error::{StockError, StockResult};
pub use events::{SaleItem, SaleNotification};
pub use handlers::ApiDoc;
pub use ledger::{InMemoryStockLedger, StockLedger};
pub use models::Product;
pub use postgres::PgStockLedger;
pub use processor::SaleProcessor;
