//! Fulfillment provider seam.
//!
//! [`FulfillmentProvider`] is what the dispatcher, the reconciler and the
//! player verifier talk to. [`G2BulkClient`] is the HTTP implementation.

mod g2bulk;

pub use g2bulk::G2BulkClient;

use crate::entities::OrderStatus;
use async_trait::async_trait;
use itertools::Itertools;
use serde::Deserialize;
use thiserror::Error;

/// Errors talking to the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport or decoding failure
    #[error("provider request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered with a non-success HTTP status
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The provider answered `success: false`
    #[error("provider rejected the request: {message}")]
    Rejected { message: String },

    /// The provider answered without the expected payload
    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("invalid provider endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// A purchase request sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOrderRequest {
    pub product_id: String,
    pub type_id: String,
    pub player_id: String,
    pub server_id: Option<String>,
    pub quantity: u32,
    /// Our order id, echoed back by the provider for support lookups.
    pub reference: String,
}

/// One delivered item as the provider reports it: a bare code or an object
/// carrying the code in one of several fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DeliveryItem {
    Code(String),
    Voucher {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        serial: Option<String>,
        #[serde(default)]
        pin: Option<String>,
    },
}

impl DeliveryItem {
    /// Render the item as the text shown to the customer.
    pub fn render(&self) -> String {
        match self {
            DeliveryItem::Code(code) => code.trim().to_string(),
            DeliveryItem::Voucher { code, serial, pin } => {
                let field = |label: &str, value: &Option<String>| {
                    value
                        .as_deref()
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(|v| format!("{label}{v}"))
                };
                [
                    field("", code),
                    field("Serial: ", serial),
                    field("PIN: ", pin),
                ]
                .into_iter()
                .flatten()
                .join(" / ")
            }
        }
    }
}

/// The provider's view of one of its orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOrder {
    pub order_id: String,
    pub status: String,
    pub delivery_items: Vec<DeliveryItem>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCheckRequest {
    pub game_code: String,
    pub player_id: String,
    pub server_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCheck {
    pub valid: bool,
    pub player_name: Option<String>,
    pub message: Option<String>,
}

#[async_trait]
pub trait FulfillmentProvider: Send + Sync {
    /// Place a purchase with the provider.
    async fn create_order(
        &self,
        request: &ProviderOrderRequest,
    ) -> Result<ProviderOrder, ProviderError>;

    /// Look up an order previously placed with [`create_order`](Self::create_order).
    async fn get_order(&self, provider_order_id: &str) -> Result<ProviderOrder, ProviderError>;

    /// Check that a player id exists for a provider game code.
    async fn check_player(&self, request: &PlayerCheckRequest)
    -> Result<PlayerCheck, ProviderError>;
}

/// Map a provider status string onto an internal status.
///
/// `None` means the status is unknown and the order must be left unchanged.
pub fn map_provider_status(status: &str) -> Option<OrderStatus> {
    match status.trim().to_ascii_uppercase().as_str() {
        "COMPLETED" => Some(OrderStatus::Completed),
        "FAILED" => Some(OrderStatus::Failed),
        "PROCESSING" | "PENDING" => Some(OrderStatus::Processing),
        _ => None,
    }
}

/// Trimmed, non-empty, de-duplicated codes in provider order.
pub fn normalize_delivery_items(items: &[DeliveryItem]) -> Vec<String> {
    items
        .iter()
        .map(DeliveryItem::render)
        .filter(|code| !code.is_empty())
        .unique()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_is_case_insensitive() {
        assert_eq!(map_provider_status("COMPLETED"), Some(OrderStatus::Completed));
        assert_eq!(map_provider_status("completed"), Some(OrderStatus::Completed));
        assert_eq!(map_provider_status("Failed"), Some(OrderStatus::Failed));
        assert_eq!(map_provider_status("processing"), Some(OrderStatus::Processing));
        assert_eq!(map_provider_status(" PENDING "), Some(OrderStatus::Processing));
        assert_eq!(map_provider_status("REFUNDED"), None);
        assert_eq!(map_provider_status(""), None);
    }

    #[test]
    fn test_delivery_items_deserialize_both_shapes() {
        let items: Vec<DeliveryItem> = serde_json::from_str(
            r#"["ABC-1", {"code": "XYZ"}, {"serial": "S1", "pin": "1234"}]"#,
        )
        .unwrap();
        assert_eq!(
            normalize_delivery_items(&items),
            vec!["ABC-1", "XYZ", "Serial: S1 / PIN: 1234"]
        );
    }

    #[test]
    fn test_normalize_trims_dedups_and_keeps_order() {
        let items = vec![
            DeliveryItem::Code(" B ".to_string()),
            DeliveryItem::Code("A".to_string()),
            DeliveryItem::Code("".to_string()),
            DeliveryItem::Code("B".to_string()),
            DeliveryItem::Voucher {
                code: Some("  ".to_string()),
                serial: None,
                pin: None,
            },
        ];
        assert_eq!(normalize_delivery_items(&items), vec!["B", "A"]);
    }
}
