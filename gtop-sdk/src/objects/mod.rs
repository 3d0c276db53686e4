//! Request and response bodies for every gateway endpoint.

pub mod admin;
pub mod fulfillment;
pub mod orders;
pub mod verification;
pub mod wallet;
pub mod webhook;

use serde::{Deserialize, Serialize};

pub use admin::{
    AdminAdjustmentResponse, AdminProductRequest, AdminUserResponse, AdminWalletRequest,
    ProductLinkResponse, clamp_pagination,
};
pub use fulfillment::{FulfillRequest, FulfillResponse, ReconcileReportResponse};
pub use orders::{CreateOrderRequest, OrderResponse};
pub use verification::{VerifyPlayerRequest, VerifyPlayerResponse};
pub use wallet::{BalanceResponse, WalletMutationResponse, WalletRequest};
pub use webhook::{PaymentWebhookPayload, WebhookReply, WebhookReplyStatus};

/// Order status for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `gtop-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Completed,
    Failed,
    PendingManual,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Paid => write!(f, "paid"),
            OrderStatus::Processing => write!(f, "processing"),
            OrderStatus::Completed => write!(f, "completed"),
            OrderStatus::Failed => write!(f, "failed"),
            OrderStatus::PendingManual => write!(f, "pending_manual"),
        }
    }
}

/// Error body returned by the storefront-facing endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
