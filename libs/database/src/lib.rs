//! PostgreSQL connectivity shared by the sales and stock services.
//!
//! # Features
//!
//! - `postgres` (default) - SeaORM connection pool, migrations, health check
//! - `config` (default) - `PostgresConfig` loading through `core_config::FromEnv`
//!
//! # Example
//!
//! ```ignore
//! use core_config::FromEnv;
//! use database::postgres::{self, PostgresConfig};
//!
//! let db = postgres::connect_from_config_with_retry(PostgresConfig::from_env()?, None).await?;
//! postgres::run_migrations::<migration::StockMigrator>(&db, "stock_worker").await?;
//! ```

pub mod common;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use common::DatabaseError;
