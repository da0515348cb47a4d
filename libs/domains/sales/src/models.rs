use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::StringLen;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub const EMPTY_ORDER_MESSAGE: &str = "Order must have at least one item.";

/// Order lifecycle status. Orders are created `Confirmed` directly.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    DeriveActiveEnum,
    EnumIter,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
}

/// One product line with the unit price captured at order time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
    #[schema(value_type = String, example = "19.99")]
    pub unit_price: Decimal,
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Order aggregate. The total is always derived from the lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub items: Vec<OrderLine>,
}

impl Order {
    pub fn confirmed(customer_id: Option<String>, items: Vec<OrderLine>) -> Self {
        Self {
            id: Uuid::now_v7(),
            customer_id,
            // Postgres keeps microseconds; truncate so a re-read compares equal.
            created_at: Utc::now().trunc_subsecs(6),
            status: OrderStatus::Confirmed,
            items,
        }
    }

    pub fn total(&self) -> Decimal {
        self.items.iter().map(OrderLine::line_total).sum()
    }
}

/// Order representation returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    #[schema(value_type = String, example = "59.97")]
    pub total: Decimal,
    pub items: Vec<OrderLine>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let total = order.total();
        Self {
            id: order.id,
            customer_id: order.customer_id,
            created_at: order.created_at,
            status: order.status,
            total,
            items: order.items,
        }
    }
}

/// DTO for creating an order
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    pub customer_id: Option<String>,
    #[validate(length(min = 1, message = "Order must have at least one item."), nested)]
    pub items: Vec<CreateOrderItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItem {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be greater than zero."))]
    pub quantity: i32,
}

/// Point-in-time answer from the stock service for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockAvailability {
    pub available: i32,
    pub unit_price: Decimal,
}

/// A line whose requested quantity exceeds what the stock service reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    pub product_id: Uuid,
    pub available: i32,
    pub requested: i32,
}

impl std::fmt::Display for Shortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Product {} is out of stock. Available: {}, ordered: {}.",
            self.product_id, self.available, self.requested
        )
    }
}
