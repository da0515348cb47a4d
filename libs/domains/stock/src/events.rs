//! Sale notification as received from the broker.

use messaging::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

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
