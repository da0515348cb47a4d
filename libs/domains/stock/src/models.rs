use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A product and its available stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = String, example = "49.90")]
    pub price: Decimal,
    /// Never negative
    pub stock_quantity: i32,
}

impl Product {
    pub fn new(name: impl Into<String>, price: Decimal, stock_quantity: i32) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: None,
            price,
            stock_quantity,
        }
    }
}
