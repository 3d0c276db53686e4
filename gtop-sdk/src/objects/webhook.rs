//! Payment confirmation webhook bodies.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Body posted by the payment gateway when a payment is confirmed.
///
/// The gateway has used both `transaction_id` and `transactionId` over time,
/// so both spellings are accepted. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentWebhookPayload {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default, alias = "transactionId")]
    pub transaction_id: Option<String>,
    #[serde(default, alias = "paymentMethod")]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookReplyStatus {
    Success,
    Error,
}

/// Body of every webhook reply.
///
/// The HTTP status of an authenticated webhook call is always `200 OK`; the
/// real outcome is carried here and in the persisted order state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookReply {
    pub status: WebhookReplyStatus,
    pub message: String,
}

impl WebhookReply {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: WebhookReplyStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: WebhookReplyStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == WebhookReplyStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_payload_accepts_both_transaction_spellings() {
        let snake: PaymentWebhookPayload =
            serde_json::from_str(r#"{"amount": 5.00, "transaction_id": "T1"}"#).unwrap();
        let camel: PaymentWebhookPayload =
            serde_json::from_str(r#"{"amount": "5.00", "transactionId": "T1", "extra": 1}"#)
                .unwrap();
        assert_eq!(snake.transaction_id.as_deref(), Some("T1"));
        assert_eq!(camel.transaction_id.as_deref(), Some("T1"));
        assert_eq!(camel.amount, Some(Decimal::from_str("5.00").unwrap()));
    }

    #[test]
    fn test_reply_serialization() {
        let json = serde_json::to_value(WebhookReply::error("User not found")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "error", "message": "User not found"})
        );
    }
}
