use super::{
    DeliveryItem, FulfillmentProvider, PlayerCheck, PlayerCheckRequest, ProviderError,
    ProviderOrder, ProviderOrderRequest,
};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const API_KEY_HEADER: &str = "X-API-Key";

/// HTTP client for the G2Bulk reseller API.
pub struct G2BulkClient {
    base_url: Url,
    api_key: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    product_id: &'a str,
    type_id: &'a str,
    player_id: &'a str,
    server_id: Option<&'a str>,
    quantity: u32,
    reference: &'a str,
}

#[derive(Debug, Serialize)]
struct CheckPlayerBody<'a> {
    game: &'a str,
    user_id: &'a str,
    server_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    order: Option<OrderBody>,
    #[serde(default)]
    valid: Option<bool>,
    #[serde(default)]
    player_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderBody {
    #[serde(deserialize_with = "string_or_number")]
    order_id: String,
    status: String,
    #[serde(default)]
    delivery_items: Option<Vec<DeliveryItem>>,
}

/// Provider order ids arrive as either JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

impl G2BulkClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            http_client,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Envelope, ProviderError> {
        let response = request.header(API_KEY_HEADER, &self.api_key).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let envelope: Envelope = response.json().await?;
        if !envelope.success {
            return Err(ProviderError::Rejected {
                message: envelope
                    .message
                    .unwrap_or_else(|| "no message".to_string()),
            });
        }
        Ok(envelope)
    }

    fn into_provider_order(envelope: Envelope) -> Result<ProviderOrder, ProviderError> {
        let order = envelope
            .order
            .ok_or_else(|| ProviderError::Malformed("missing order object".to_string()))?;
        Ok(ProviderOrder {
            order_id: order.order_id,
            status: order.status,
            delivery_items: order.delivery_items.unwrap_or_default(),
            message: envelope.message,
        })
    }
}

#[async_trait]
impl FulfillmentProvider for G2BulkClient {
    async fn create_order(
        &self,
        request: &ProviderOrderRequest,
    ) -> Result<ProviderOrder, ProviderError> {
        let url = self.base_url.join("orders")?;
        let body = CreateOrderBody {
            product_id: &request.product_id,
            type_id: &request.type_id,
            player_id: &request.player_id,
            server_id: request.server_id.as_deref(),
            quantity: request.quantity,
            reference: &request.reference,
        };
        debug!(reference = %request.reference, product_id = %request.product_id, "Creating provider order");
        let envelope = self.send(self.http_client.post(url).json(&body)).await?;
        Self::into_provider_order(envelope)
    }

    async fn get_order(&self, provider_order_id: &str) -> Result<ProviderOrder, ProviderError> {
        let url = self.base_url.join(&format!("orders/{provider_order_id}"))?;
        let envelope = self.send(self.http_client.get(url)).await?;
        Self::into_provider_order(envelope)
    }

    async fn check_player(
        &self,
        request: &PlayerCheckRequest,
    ) -> Result<PlayerCheck, ProviderError> {
        let url = self.base_url.join("games/checkPlayerId")?;
        let body = CheckPlayerBody {
            game: &request.game_code,
            user_id: &request.player_id,
            server_id: request.server_id.as_deref(),
        };
        let envelope = match self.send(self.http_client.post(url).json(&body)).await {
            Ok(envelope) => envelope,
            // An unknown player is reported as `success: false`.
            Err(ProviderError::Rejected { message }) => {
                return Ok(PlayerCheck {
                    valid: false,
                    player_name: None,
                    message: Some(message),
                });
            }
            Err(e) => return Err(e),
        };
        Ok(PlayerCheck {
            valid: envelope.valid.unwrap_or(true),
            player_name: envelope.player_name,
            message: envelope.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_envelope_parsing() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"success": true, "message": "ok",
                "order": {"order_id": 98765, "status": "COMPLETED",
                          "delivery_items": ["CODE-1", {"code": "CODE-2"}]}}"#,
        )
        .unwrap();
        let order = G2BulkClient::into_provider_order(envelope).unwrap();
        assert_eq!(order.order_id, "98765");
        assert_eq!(order.status, "COMPLETED");
        assert_eq!(order.delivery_items.len(), 2);
        assert_eq!(order.message.as_deref(), Some("ok"));
    }

    #[test]
    fn test_missing_order_object_is_malformed() {
        let envelope: Envelope = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(matches!(
            G2BulkClient::into_provider_order(envelope),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_endpoint_join_keeps_base_path() {
        let base = Url::parse("https://api.g2bulk.example/v1/").unwrap();
        assert_eq!(
            base.join("orders/42").unwrap().as_str(),
            "https://api.g2bulk.example/v1/orders/42"
        );
    }
}
