//! Wire format of the sale notification sent to the stock service.

use messaging::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Order;

/// `{ "orderId": "...", "items": [{ "productId": "...", "quantity": 3 }] }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleNotification {
    pub order_id: Uuid,
    pub items: Vec<SaleItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

impl Message for SaleNotification {
    fn message_id(&self) -> String {
        self.order_id.to_string()
    }
}

impl From<&Order> for SaleNotification {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            items: order
                .items
                .iter()
                .map(|line| SaleItem {
                    product_id: line.product_id,
                    quantity: line.quantity,
                })
                .collect(),
        }
    }
}
