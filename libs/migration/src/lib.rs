pub use sea_orm_migration::prelude::*;

mod m20260105_000000_create_products;
mod m20260105_000001_create_orders;
mod m20260105_000002_seed_products;

/// Every table in one schema. Used by the CLI and the integration test database.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260105_000000_create_products::Migration),
            Box::new(m20260105_000001_create_orders::Migration),
            Box::new(m20260105_000002_seed_products::Migration),
        ]
    }
}

/// Orders and order lines owned by the sales API.
pub struct SalesMigrator;

#[async_trait::async_trait]
impl MigratorTrait for SalesMigrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20260105_000001_create_orders::Migration)]
    }

    // Separate history so both services can share one database.
    fn migration_table_name() -> DynIden {
        Alias::new("seaql_migrations_sales").into_iden()
    }
}

/// Products and their seed rows owned by the stock worker.
pub struct StockMigrator;

#[async_trait::async_trait]
impl MigratorTrait for StockMigrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260105_000000_create_products::Migration),
            Box::new(m20260105_000002_seed_products::Migration),
        ]
    }

    fn migration_table_name() -> DynIden {
        Alias::new("seaql_migrations_stock").into_iden()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names<M: MigratorTrait>() -> Vec<String> {
        M::migrations().iter().map(|m| m.name().to_string()).collect()
    }

    #[test]
    fn test_sales_migrator_only_creates_orders() {
        assert_eq!(names::<SalesMigrator>(), vec!["m20260105_000001_create_orders"]);
    }

    #[test]
    fn test_stock_migrator_owns_products_and_seed() {
        assert_eq!(
            names::<StockMigrator>(),
            vec![
                "m20260105_000000_create_products",
                "m20260105_000002_seed_products"
            ]
        );
    }

    #[test]
    fn test_full_migrator_covers_both_services() {
        assert_eq!(names::<Migrator>().len(), 3);
        assert_ne!(
            SalesMigrator::migration_table_name().to_string(),
            StockMigrator::migration_table_name().to_string()
        );
    }
}
