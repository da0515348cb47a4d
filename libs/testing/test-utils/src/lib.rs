//! Shared test utilities for domain testing
//!
//! This crate provides reusable test infrastructure for the workspace crates:
//! - `TestDatabase`: PostgreSQL container with migrations applied (feature: "postgres")
//! - `TestRabbitMq`: RabbitMQ container (feature: "rabbitmq")
//! - `TestDataBuilder`: Deterministic test data generation (always available)
//!
//! Container-backed tests need Docker and are marked `#[ignore]`; run them with
//! `cargo test -- --ignored`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use test_utils::{TestDatabase, TestDataBuilder};
//!
//! #[tokio::test]
//! #[ignore = "requires Docker"]
//! async fn my_postgres_test() {
//!     let db = TestDatabase::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_test");
//!
//!     let product = db.create_test_product(builder.product_id(0), &builder.name("product", "main"), 5).await;
//! }
//! ```

use uuid::Uuid;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "rabbitmq")]
mod rabbitmq;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

#[cfg(feature = "rabbitmq")]
pub use rabbitmq::TestRabbitMq;

/// Builder for test data with deterministic randomization
///
/// This ensures tests are reproducible by using seeded data.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_conditional_decrement");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    fn uuid(&self, salt: u64) -> Uuid {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.seed.to_le_bytes());
        bytes[8..].copy_from_slice(&salt.to_le_bytes());
        Uuid::from_bytes(bytes)
    }

    /// The `n`-th product id of this test
    pub fn product_id(&self, n: u32) -> Uuid {
        self.uuid(u64::from(n))
    }

    pub fn order_id(&self) -> Uuid {
        self.uuid(u64::MAX)
    }

    /// Generate a unique name, e.g. `test-product-12345-main`
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_builder_deterministic() {
        let builder1 = TestDataBuilder::new(42);
        let builder2 = TestDataBuilder::new(42);

        assert_eq!(builder1.product_id(0), builder2.product_id(0));
        assert_eq!(builder1.order_id(), builder2.order_id());
        assert_eq!(
            builder1.name("product", "test"),
            builder2.name("product", "test")
        );
    }

    #[test]
    fn test_data_builder_ids_are_distinct() {
        let builder = TestDataBuilder::from_test_name("my_test");

        assert_ne!(builder.product_id(0), builder.product_id(1));
        assert_ne!(builder.product_id(0), builder.order_id());
    }

    #[test]
    fn test_data_builder_different_names() {
        let builder1 = TestDataBuilder::from_test_name("test1");
        let builder2 = TestDataBuilder::from_test_name("test2");

        assert_ne!(builder1.product_id(0), builder2.product_id(0));
    }
}
