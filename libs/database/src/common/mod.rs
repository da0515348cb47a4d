//! Error type and retry helper shared by the connectors.

pub mod error;
pub mod retry;

pub use error::DatabaseError;
pub use retry::{RetryConfig, retry, retry_with_backoff};
