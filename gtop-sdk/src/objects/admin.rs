//! Admin API request and response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// `POST /functions/v1/admin-wallet` request, dispatched on `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum AdminWalletRequest {
    ListUsers {
        #[serde(default = "default_limit")]
        limit: i64,
        #[serde(default)]
        offset: i64,
    },
    AddBalance {
        target_user_id: Uuid,
        #[serde(default)]
        amount: Option<Decimal>,
        #[serde(default)]
        description: Option<String>,
    },
    DeductBalance {
        target_user_id: Uuid,
        #[serde(default)]
        amount: Option<Decimal>,
        #[serde(default)]
        description: Option<String>,
    },
}

/// `POST /functions/v1/admin-products` request, dispatched on `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum AdminProductRequest {
    ListLinks,
    Link {
        package_id: Uuid,
        product_id: String,
        type_id: String,
    },
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// A user together with their current wallet balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserResponse {
    pub id: Uuid,
    pub email: Option<String>,
    pub balance: Decimal,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAdjustmentResponse {
    pub success: bool,
    pub new_balance: Decimal,
    pub transaction_id: i64,
    pub reference_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductLinkResponse {
    pub package_id: Uuid,
    pub product_id: String,
    pub type_id: String,
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;
const MAX_OFFSET: i64 = 100_000;

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

/// Clamp limit and offset to safe maximums.
pub fn clamp_pagination(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, MAX_LIMIT), offset.clamp(0, MAX_OFFSET))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_wallet_request_parsing() {
        let id = Uuid::new_v4();
        let req: AdminWalletRequest = serde_json::from_str(&format!(
            r#"{{"action": "deduct-balance", "targetUserId": "{id}", "amount": 2.5}}"#
        ))
        .unwrap();
        match req {
            AdminWalletRequest::DeductBalance {
                target_user_id,
                amount,
                description,
            } => {
                assert_eq!(target_user_id, id);
                assert_eq!(amount, Some(Decimal::new(25, 1)));
                assert_eq!(description, None);
            }
            other => panic!("unexpected request: {other:?}"),
        }

        let req: AdminWalletRequest =
            serde_json::from_str(r#"{"action": "list-users"}"#).unwrap();
        assert_eq!(
            req,
            AdminWalletRequest::ListUsers {
                limit: DEFAULT_LIMIT,
                offset: 0
            }
        );
    }

    #[test]
    fn test_clamp_pagination() {
        assert_eq!(clamp_pagination(0, -5), (1, 0));
        assert_eq!(clamp_pagination(10_000, 10), (MAX_LIMIT, 10));
        assert_eq!(clamp_pagination(20, 1_000_000), (20, MAX_OFFSET));
    }
}
