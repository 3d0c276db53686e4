//! Wallet endpoint bodies.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `POST /functions/v1/wallet` request, dispatched on `action`.
///
/// Amounts are optional at the wire level so that a missing amount is
/// reported as an invalid amount rather than as a malformed body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum WalletRequest {
    GetBalance,
    Topup {
        #[serde(default)]
        amount: Option<Decimal>,
    },
    Purchase {
        #[serde(default)]
        amount: Option<Decimal>,
        #[serde(default)]
        order_id: Option<Uuid>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletMutationResponse {
    pub success: bool,
    pub new_balance: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_request_actions() {
        let req: WalletRequest = serde_json::from_str(r#"{"action": "get-balance"}"#).unwrap();
        assert_eq!(req, WalletRequest::GetBalance);

        let req: WalletRequest =
            serde_json::from_str(r#"{"action": "topup", "amount": 10}"#).unwrap();
        assert_eq!(
            req,
            WalletRequest::Topup {
                amount: Some(Decimal::from(10))
            }
        );

        let id = Uuid::new_v4();
        let req: WalletRequest = serde_json::from_str(&format!(
            r#"{{"action": "purchase", "amount": 3, "orderId": "{id}"}}"#
        ))
        .unwrap();
        assert_eq!(
            req,
            WalletRequest::Purchase {
                amount: Some(Decimal::from(3)),
                order_id: Some(id)
            }
        );

        let req: WalletRequest = serde_json::from_str(r#"{"action": "purchase"}"#).unwrap();
        assert_eq!(
            req,
            WalletRequest::Purchase {
                amount: None,
                order_id: None
            }
        );
    }
}
