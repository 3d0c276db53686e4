//! Internal fulfillment/poll endpoint bodies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OrderStatus;

/// `POST /functions/v1/g2bulk-fulfill` request, dispatched on `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum FulfillRequest {
    /// Dispatch fulfillment for an order already in `processing`.
    Fulfill { order_id: Uuid },
    /// Run one reconciler sweep.
    Poll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillResponse {
    pub success: bool,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub message: Option<String>,
}

/// Aggregate counts of one reconciler sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReportResponse {
    pub checked: u32,
    pub updated: u32,
    pub completed: u32,
    pub failed: u32,
    /// Orphaned `processing` orders moved to `pending_manual`.
    #[serde(default)]
    pub parked: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fulfill_request_parsing() {
        let id = Uuid::new_v4();
        let req: FulfillRequest = serde_json::from_str(&format!(
            r#"{{"orderId": "{id}", "action": "fulfill"}}"#
        ))
        .unwrap();
        assert_eq!(req, FulfillRequest::Fulfill { order_id: id });

        let req: FulfillRequest = serde_json::from_str(r#"{"action": "poll"}"#).unwrap();
        assert_eq!(req, FulfillRequest::Poll);
    }
}
