use async_trait::async_trait;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryOrder, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    entity::{order_items, orders},
    error::OrderResult,
    models::{Order, OrderLine},
    repository::OrderRepository,
};

#[derive(Clone)]
pub struct PgOrderRepository {
    db: DatabaseConnection,
}

impl PgOrderRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create(&self, order: Order) -> OrderResult<Order> {
        let txn = self.db.begin().await?;

        orders::ActiveModel {
            id: Set(order.id),
            customer_id: Set(order.customer_id.clone()),
            created_at: Set(order.created_at.into()),
            status: Set(order.status),
        }
        .insert(&txn)
        .await?;

        let lines = order.items.iter().map(|line| order_items::ActiveModel {
            id: Set(Uuid::now_v7()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
        });
        order_items::Entity::insert_many(lines).exec(&txn).await?;

        // Dropping the transaction before this point rolls it back.
        txn.commit().await?;

        tracing::info!(order_id = %order.id, items = order.items.len(), "Persisted order");
        Ok(order)
    }

    async fn get_by_id(&self, id: Uuid) -> OrderResult<Option<Order>> {
        let Some(model) = orders::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let items = model
            .find_related(order_items::Entity)
            .order_by_asc(order_items::Column::Id)
            .all(&self.db)
            .await?;

        Ok(Some(to_domain(model, items)))
    }
}

fn to_domain(model: orders::Model, items: Vec<order_items::Model>) -> Order {
    Order {
        id: model.id,
        customer_id: model.customer_id,
        created_at: model.created_at.into(),
        status: model.status,
        items: items
            .into_iter()
            .map(|item| OrderLine {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_get_by_id_maps_lines_in_order() {
        let order_id = Uuid::now_v7();
        let created_at = chrono::Utc::now().fixed_offset();
        let first = Uuid::now_v7();
        let second = Uuid::now_v7();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![orders::Model {
                id: order_id,
                customer_id: Some("customer-1".into()),
                created_at,
                status: OrderStatus::Confirmed,
            }]])
            .append_query_results([vec![
                order_items::Model {
                    id: Uuid::now_v7(),
                    order_id,
                    product_id: first,
                    quantity: 2,
                    unit_price: dec!(10.00),
                },
                order_items::Model {
                    id: Uuid::now_v7(),
                    order_id,
                    product_id: second,
                    quantity: 1,
                    unit_price: dec!(2.50),
                },
            ]])
            .into_connection();

        let repo = PgOrderRepository::new(db);
        let order = repo.get_by_id(order_id).await.unwrap().unwrap();

        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].product_id, first);
        assert_eq!(order.items[1].product_id, second);
        assert_eq!(order.total(), dec!(22.50));
    }

    #[tokio::test]
    async fn test_get_by_id_missing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<orders::Model>::new()])
            .into_connection();

        let repo = PgOrderRepository::new(db);
        assert!(repo.get_by_id(Uuid::now_v7()).await.unwrap().is_none());
    }
}
