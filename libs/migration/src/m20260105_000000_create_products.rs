use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(pk_uuid(Products::Id))
                    .col(string_len(Products::Name, 100))
                    .col(text_null(Products::Description))
                    .col(decimal_len(Products::Price, 18, 2))
                    .col(integer(Products::StockQuantity).default(0))
                    .to_owned(),
            )
            .await?;

        // Last line of defence for the conditional decrement
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                ALTER TABLE products
                    ADD CONSTRAINT ck_products_stock_quantity_non_negative
                    CHECK (stock_quantity >= 0)
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    Name,
    Description,
    Price,
    StockQuantity,
}
