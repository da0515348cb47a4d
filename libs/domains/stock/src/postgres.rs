use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, Statement};
use uuid::Uuid;

use crate::entity;
use crate::error::StockResult;
use crate::ledger::{StockLedger, ensure_positive};
use crate::models::Product;

/// Check and subtract in one statement so concurrent consumers cannot oversell.
const DECREMENT_SQL: &str = "UPDATE products \
     SET stock_quantity = stock_quantity - $1 \
     WHERE id = $2 AND stock_quantity >= $1";

/// PostgreSQL implementation of StockLedger using SeaORM
#[derive(Clone)]
pub struct PgStockLedger {
    db: DatabaseConnection,
}

impl PgStockLedger {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StockLedger for PgStockLedger {
    async fn decrement(&self, product_id: Uuid, quantity: i32) -> StockResult<u64> {
        ensure_positive(quantity)?;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            DECREMENT_SQL,
            [quantity.into(), product_id.into()],
        );
        let result = self.db.execute_raw(stmt).await?;

        Ok(result.rows_affected())
    }

    async fn get_product(&self, id: Uuid) -> StockResult<Option<Product>> {
        let model = entity::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }
}
