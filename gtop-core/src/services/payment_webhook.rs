//! Payment confirmation handling.
//!
//! A confirmation names its target in the URL path. Targets of the form
//! `wallet-<userIdPrefix>-<suffix>` credit a wallet; any other target must
//! be an order id. Authentication happens before this module is reached;
//! from here on every outcome is a [`WebhookReply`].

use crate::entities::LedgerEntryType;
use crate::entities::OrderStatus;
use crate::entities::orders::ClaimOrderForProcessing;
use crate::entities::wallet_transactions::NewWalletEntry;
use crate::processors::fulfillment::{FulfillmentDispatcher, FulfillmentOutcome};
use crate::repository::{Repository, WalletEntryOutcome};
use crate::services::wallet::validate_amount;
use gtop_sdk::objects::{PaymentWebhookPayload, WebhookReply};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const WALLET_MARKER_PREFIX: &str = "wallet-";
const DEFAULT_PAYMENT_METHOD: &str = "qr";

/// What a webhook target refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookTarget {
    /// `wallet-<userIdPrefix>-<suffix>`. `user_prefix` is lowercased and may
    /// still fail to match any user.
    WalletTopup { user_prefix: String },
    Order(Uuid),
    Unknown,
}

pub fn classify_target(target: &str) -> WebhookTarget {
    let target = target.trim();
    if let Some(marker) = target.strip_prefix(WALLET_MARKER_PREFIX) {
        let user_prefix = match marker.split_once('-') {
            Some((prefix, suffix)) if !suffix.is_empty() => prefix,
            _ => "",
        };
        return WebhookTarget::WalletTopup {
            user_prefix: user_prefix.to_ascii_lowercase(),
        };
    }
    match Uuid::parse_str(target) {
        Ok(id) => WebhookTarget::Order(id),
        Err(_) => WebhookTarget::Unknown,
    }
}

/// A usable user id prefix: non-empty hex digits.
fn is_valid_user_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_hexdigit())
}

pub struct PaymentWebhookService {
    repo: Arc<dyn Repository>,
    dispatcher: Arc<FulfillmentDispatcher>,
}

impl PaymentWebhookService {
    pub fn new(repo: Arc<dyn Repository>, dispatcher: Arc<FulfillmentDispatcher>) -> Self {
        Self { repo, dispatcher }
    }

    /// Handle one confirmation. Only storage failures are returned as
    /// errors. A claimed order left without a provider order id by such a
    /// failure is parked by the reconciler once its grace period passes.
    #[tracing::instrument(skip_all, err, fields(webhook_target = %target))]
    pub async fn handle(
        &self,
        target: &str,
        payload: &PaymentWebhookPayload,
    ) -> Result<WebhookReply, sqlx::Error> {
        match classify_target(target) {
            WebhookTarget::WalletTopup { user_prefix } => {
                self.credit_wallet(target.trim(), &user_prefix, payload).await
            }
            WebhookTarget::Order(order_id) => self.confirm_order(order_id, payload).await,
            WebhookTarget::Unknown => Ok(WebhookReply::error("Order not found")),
        }
    }

    async fn credit_wallet(
        &self,
        marker: &str,
        user_prefix: &str,
        payload: &PaymentWebhookPayload,
    ) -> Result<WebhookReply, sqlx::Error> {
        let Ok(amount) = validate_amount(payload.amount) else {
            return Ok(WebhookReply::error("Invalid amount"));
        };
        if !is_valid_user_prefix(user_prefix) {
            return Ok(WebhookReply::error("User not found"));
        }

        let users = self.repo.find_users_by_id_prefix(user_prefix).await?;
        let user_id = match users.as_slice() {
            [] => {
                warn!(user_prefix, "Wallet top-up for unknown user");
                return Ok(WebhookReply::error("User not found"));
            }
            [user_id] => *user_id,
            _ => {
                warn!(user_prefix, "Wallet top-up marker matches several users");
                return Ok(WebhookReply::error("Ambiguous user reference"));
            }
        };

        let description = match payload.transaction_id.as_deref() {
            Some(tx) => format!("Wallet top-up (transaction {tx})"),
            None => "Wallet top-up".to_string(),
        };
        let entry = NewWalletEntry {
            user_id,
            entry_type: LedgerEntryType::Topup,
            amount,
            order_id: None,
            reference_id: Some(marker.to_string()),
            description,
        };

        Ok(match self.repo.append_entry(entry).await? {
            WalletEntryOutcome::Applied(row) => {
                info!(user_id = %user_id, amount = %amount, balance = %row.balance_after, "Wallet credited from payment");
                WebhookReply::success("Wallet topped up")
            }
            WalletEntryOutcome::Duplicate { .. } => {
                info!(user_id = %user_id, marker, "Duplicate wallet top-up ignored");
                WebhookReply::success("Top-up already processed")
            }
            WalletEntryOutcome::InsufficientBalance { .. } => WebhookReply::error("Invalid amount"),
        })
    }

    async fn confirm_order(
        &self,
        order_id: Uuid,
        payload: &PaymentWebhookPayload,
    ) -> Result<WebhookReply, sqlx::Error> {
        let Some(order) = self.repo.get_order(order_id).await? else {
            return Ok(WebhookReply::error("Order not found"));
        };
        if !order.status.is_claimable() {
            return Ok(WebhookReply::success("Order already processed"));
        }
        if payload.amount.is_some_and(|paid| paid < order.amount) {
            warn!(
                order_id = %order_id,
                expected = %order.amount,
                paid = ?payload.amount,
                "Payment amount lower than order amount"
            );
            return Ok(WebhookReply::error("Amount mismatch"));
        }

        let transaction_id = payload.transaction_id.as_deref().unwrap_or("unknown");
        let payment_method = payload
            .payment_method
            .clone()
            .or_else(|| order.payment_method.clone())
            .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string());
        let claim = ClaimOrderForProcessing {
            order_id,
            status_message: format!(
                "Payment confirmed via {payment_method} (transaction {transaction_id})"
            ),
            payment_method,
        };
        let Some(claimed) = self.repo.claim_order(claim).await? else {
            info!(order_id = %order_id, "Order claimed by a concurrent delivery");
            return Ok(WebhookReply::success("Order already processed"));
        };
        info!(order_id = %order_id, transaction_id, "Payment confirmed, dispatching fulfillment");

        Ok(match self.dispatcher.dispatch_or_park(claimed).await? {
            FulfillmentOutcome::Dispatched(order) => match order.status {
                OrderStatus::Completed => WebhookReply::success("Payment confirmed and order fulfilled"),
                status => WebhookReply::success(format!("Payment confirmed; order is {status}")),
            },
            FulfillmentOutcome::Parked { .. } => {
                WebhookReply::success("Payment confirmed; order queued for manual fulfillment")
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::order_event_channel;
    use crate::provider::DeliveryItem;
    use crate::repository::{OrderRepository, WalletRepository};
    use crate::testing::{InMemoryRepository, ScriptedProvider, provider_order, sample_order};
    use gtop_sdk::objects::WebhookReplyStatus;
    use rust_decimal::Decimal;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn payload(amount: &str, tx: &str) -> PaymentWebhookPayload {
        PaymentWebhookPayload {
            amount: Some(d(amount)),
            transaction_id: Some(tx.to_string()),
            payment_method: None,
        }
    }

    fn setup() -> (Arc<InMemoryRepository>, Arc<ScriptedProvider>, PaymentWebhookService) {
        let repo = Arc::new(InMemoryRepository::new());
        let provider = Arc::new(ScriptedProvider::new());
        let (tx, _rx) = order_event_channel();
        let dispatcher = Arc::new(FulfillmentDispatcher::new(repo.clone(), provider.clone(), tx));
        let service = PaymentWebhookService::new(repo.clone(), dispatcher);
        (repo, provider, service)
    }

    #[test]
    fn test_classify_target() {
        let id = Uuid::new_v4();
        assert_eq!(classify_target(&id.to_string()), WebhookTarget::Order(id));
        assert_eq!(
            classify_target("wallet-ABCD1234-999888"),
            WebhookTarget::WalletTopup {
                user_prefix: "abcd1234".to_string()
            }
        );
        assert_eq!(
            classify_target("wallet-abcd1234"),
            WebhookTarget::WalletTopup {
                user_prefix: String::new()
            }
        );
        assert_eq!(classify_target("order-17"), WebhookTarget::Unknown);
    }

    #[tokio::test]
    async fn test_confirmed_order_is_fulfilled() {
        let (repo, provider, service) = setup();
        let order = repo.insert_order(sample_order(OrderStatus::Pending, d("5.00")));
        provider.on_create(Ok(provider_order(
            "G-100",
            "COMPLETED",
            vec![DeliveryItem::Code("DIAMOND-1".to_string())],
        )));

        let reply = service
            .handle(&order.id.to_string(), &payload("5.00", "T1"))
            .await
            .unwrap();
        assert_eq!(reply.status, WebhookReplyStatus::Success);

        let stored = repo.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Completed);
        assert!(stored.status_message.unwrap().contains("T1"));
        assert_eq!(stored.delivery_items, Some(vec!["DIAMOND-1".to_string()]));
        assert_eq!(stored.provider_order_id.as_deref(), Some("G-100"));
    }

    #[tokio::test]
    async fn test_redelivery_after_terminal_state_is_a_no_op() {
        let (repo, provider, service) = setup();
        for status in [OrderStatus::Completed, OrderStatus::Failed] {
            let order = repo.insert_order(sample_order(status, d("5.00")));
            let reply = service
                .handle(&order.id.to_string(), &payload("5.00", "T2"))
                .await
                .unwrap();
            assert_eq!(reply, WebhookReply::success("Order already processed"));
            assert_eq!(repo.get_order(order.id).await.unwrap().unwrap().status, status);
            assert!(repo.transitions(order.id).is_empty());
        }
        assert!(provider.created_requests().is_empty());
    }

    #[tokio::test]
    async fn test_second_delivery_does_not_dispatch_twice() {
        let (repo, provider, service) = setup();
        let order = repo.insert_order(sample_order(OrderStatus::Paid, d("3.00")));
        provider.on_create(Ok(provider_order("G-7", "PROCESSING", vec![])));

        let first = service
            .handle(&order.id.to_string(), &payload("3.00", "T3"))
            .await
            .unwrap();
        assert!(first.is_success());
        let second = service
            .handle(&order.id.to_string(), &payload("3.00", "T3"))
            .await
            .unwrap();
        assert_eq!(second, WebhookReply::success("Order already processed"));
        assert_eq!(provider.created_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_underpayment_is_rejected_without_state_change() {
        let (repo, provider, service) = setup();
        let order = repo.insert_order(sample_order(OrderStatus::Pending, d("5.00")));

        let reply = service
            .handle(&order.id.to_string(), &payload("4.99", "T4"))
            .await
            .unwrap();
        assert_eq!(reply, WebhookReply::error("Amount mismatch"));
        assert_eq!(
            repo.get_order(order.id).await.unwrap().unwrap().status,
            OrderStatus::Pending
        );
        assert!(provider.created_requests().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_error_parks_order_but_acknowledges() {
        let (repo, provider, service) = setup();
        let order = repo.insert_order(sample_order(OrderStatus::Pending, d("5.00")));
        provider.on_create(Err("provider down".to_string()));

        let reply = service
            .handle(&order.id.to_string(), &payload("5.00", "T5"))
            .await
            .unwrap();
        assert!(reply.is_success());
        let stored = repo.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::PendingManual);
        let message = stored.status_message.unwrap();
        assert!(message.contains("T5"));
        assert!(message.contains("provider down"));
    }

    #[tokio::test]
    async fn test_unknown_targets() {
        let (_repo, _provider, service) = setup();
        let reply = service
            .handle(&Uuid::new_v4().to_string(), &payload("1.00", "T6"))
            .await
            .unwrap();
        assert_eq!(reply, WebhookReply::error("Order not found"));

        let reply = service.handle("not-an-order", &payload("1.00", "T6")).await.unwrap();
        assert_eq!(reply, WebhookReply::error("Order not found"));
    }

    #[tokio::test]
    async fn test_wallet_marker_without_user() {
        let (repo, _provider, service) = setup();
        repo.add_user("someone@example.com");

        let reply = service
            .handle("wallet-abcd1234-999888", &payload("10.00", "T7"))
            .await
            .unwrap();
        assert_eq!(reply, WebhookReply::error("User not found"));
        assert!(repo.all_ledger_rows().is_empty());
    }

    #[tokio::test]
    async fn test_wallet_topup_is_idempotent_per_marker() {
        let (repo, _provider, service) = setup();
        let user = repo.add_user("payer@example.com");
        let prefix = &user.simple().to_string()[..8];
        let marker = format!("wallet-{prefix}-555");

        let reply = service.handle(&marker, &payload("12.00", "T8")).await.unwrap();
        assert_eq!(reply, WebhookReply::success("Wallet topped up"));
        let reply = service.handle(&marker, &payload("12.00", "T8")).await.unwrap();
        assert!(reply.is_success());

        let rows = repo.ledger(user);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reference_id.as_deref(), Some(marker.as_str()));
        assert_eq!(repo.balance(user).await.unwrap(), d("12.00"));
    }

    #[tokio::test]
    async fn test_wallet_topup_rejects_bad_amount_and_ambiguity() {
        let (repo, _provider, service) = setup();
        let a = repo.add_user_with_id(Uuid::parse_str("abcd0000-0000-4000-8000-000000000001").unwrap());
        repo.add_user_with_id(Uuid::parse_str("abcd0000-0000-4000-8000-000000000002").unwrap());

        let reply = service
            .handle("wallet-abcd0000-1", &payload("0", "T9"))
            .await
            .unwrap();
        assert_eq!(reply, WebhookReply::error("Invalid amount"));

        let reply = service
            .handle("wallet-abcd0000-1", &payload("5", "T9"))
            .await
            .unwrap();
        assert_eq!(reply, WebhookReply::error("Ambiguous user reference"));
        assert!(repo.ledger(a).is_empty());
    }

    #[tokio::test]
    async fn test_wallet_topup_rejects_sub_cent_amounts() {
        let (repo, _provider, service) = setup();
        let user = repo.add_user_with_id(Uuid::parse_str("beef0000-0000-4000-8000-000000000001").unwrap());

        for amount in ["0.001", "1.005"] {
            let reply = service
                .handle("wallet-beef0000-1", &payload(amount, "T10"))
                .await
                .unwrap();
            assert_eq!(reply, WebhookReply::error("Invalid amount"));
        }
        assert!(repo.ledger(user).is_empty());

        let reply = service
            .handle("wallet-beef0000-1", &payload("0.01", "T10"))
            .await
            .unwrap();
        assert_eq!(reply, WebhookReply::success("Wallet topped up"));
        assert_eq!(repo.balance(user).await.unwrap(), d("0.01"));
    }
}
