use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
            INSERT INTO products (id, name, description, price, stock_quantity)
            VALUES
                (
                    '0194a3c0-0000-7000-8000-000000000001',
                    'Mechanical Keyboard',
                    'Tenkeyless, hot-swappable switches',
                    89.90,
                    25
                ),
                (
                    '0194a3c0-0000-7000-8000-000000000002',
                    'Wireless Mouse',
                    'Ergonomic, 2.4GHz and Bluetooth',
                    39.50,
                    60
                ),
                (
                    '0194a3c0-0000-7000-8000-000000000003',
                    '27" Monitor',
                    'QHD IPS panel, 144Hz',
                    329.00,
                    8
                ),
                (
                    '0194a3c0-0000-7000-8000-000000000004',
                    'USB-C Dock',
                    NULL,
                    119.99,
                    0
                )
            ON CONFLICT (id) DO NOTHING
            "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                "DELETE FROM products WHERE id::text LIKE '0194a3c0-0000-7000-8000-%'",
            )
            .await?;

        Ok(())
    }
}
