//! Checkout and order status bodies.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OrderStatus;

/// `POST /functions/v1/orders` request.
///
/// The price is never taken from the client: amount and currency come from
/// the catalog package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub package_id: Uuid,
    pub player_id: String,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// Order view returned by order creation and status polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub game_name: String,
    pub package_name: String,
    pub player_id: String,
    pub server_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: Option<String>,
    pub status: OrderStatus,
    pub status_message: Option<String>,
    pub delivery_items: Option<Vec<String>>,
    pub created_at: i64,
    pub updated_at: i64,
}
