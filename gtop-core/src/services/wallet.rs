//! Customer wallet operations on the append-only ledger.

use crate::entities::LedgerEntryType;
use crate::entities::OrderStatus;
use crate::entities::wallet_transactions::{NewWalletEntry, WalletTransaction};
use crate::repository::{OrderPurchase, PurchaseOutcome, Repository, WalletEntryOutcome};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Money amounts carry at most this many decimal places.
pub const AMOUNT_SCALE: u32 = 2;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Order ID is required")]
    MissingOrderId,

    #[error("Insufficient balance")]
    InsufficientBalance { balance: Decimal },

    #[error("Order not found")]
    OrderNotFound,

    #[error("Order belongs to another user")]
    NotOwner,

    #[error("Order is not pending (status: {0})")]
    OrderNotPending(OrderStatus),

    #[error("Amount does not match the order total of {expected}")]
    AmountMismatch { expected: Decimal },

    #[error("Order update failed; payment was not applied")]
    OrderUpdateFailed,

    #[error("User not found")]
    UserNotFound,

    #[error("Duplicate ledger reference")]
    DuplicateReference,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Accept only strictly positive amounts with at most two decimals.
pub fn validate_amount(amount: Option<Decimal>) -> Result<Decimal, WalletError> {
    match amount {
        Some(amount) if amount > Decimal::ZERO && amount.normalize().scale() <= AMOUNT_SCALE => {
            Ok(amount)
        }
        _ => Err(WalletError::InvalidAmount),
    }
}

pub struct WalletService {
    repo: Arc<dyn Repository>,
}

impl WalletService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<Decimal, WalletError> {
        Ok(self.repo.balance(user_id).await?)
    }

    /// Credit the caller's wallet.
    pub async fn topup(
        &self,
        user_id: Uuid,
        amount: Option<Decimal>,
    ) -> Result<WalletTransaction, WalletError> {
        let amount = validate_amount(amount)?;
        let row = append(
            &self.repo,
            NewWalletEntry {
                user_id,
                entry_type: LedgerEntryType::Topup,
                amount,
                order_id: None,
                reference_id: None,
                description: "Wallet top-up".to_string(),
            },
        )
        .await?;
        info!(user_id = %user_id, amount = %amount, balance = %row.balance_after, "Wallet topped up");
        Ok(row)
    }

    /// Pay a pending order of the caller from the wallet.
    ///
    /// The debit and the `pending -> paid` update commit together or not at
    /// all.
    pub async fn purchase(
        &self,
        user_id: Uuid,
        amount: Option<Decimal>,
        order_id: Option<Uuid>,
    ) -> Result<WalletTransaction, WalletError> {
        let amount = validate_amount(amount)?;
        let order_id = order_id.ok_or(WalletError::MissingOrderId)?;

        let outcome = self
            .repo
            .purchase_order(OrderPurchase {
                user_id,
                order_id,
                amount,
            })
            .await?;
        match outcome {
            PurchaseOutcome::Paid(row) => {
                info!(user_id = %user_id, order_id = %order_id, amount = %amount, "Order paid from wallet");
                Ok(row)
            }
            PurchaseOutcome::OrderNotFound => Err(WalletError::OrderNotFound),
            PurchaseOutcome::NotOwner => {
                warn!(user_id = %user_id, order_id = %order_id, "Wallet purchase of another user's order");
                Err(WalletError::NotOwner)
            }
            PurchaseOutcome::NotPending(status) => Err(WalletError::OrderNotPending(status)),
            PurchaseOutcome::AmountMismatch { expected } => {
                Err(WalletError::AmountMismatch { expected })
            }
            PurchaseOutcome::InsufficientBalance { balance } => {
                Err(WalletError::InsufficientBalance { balance })
            }
            PurchaseOutcome::OrderUpdateFailed => {
                warn!(user_id = %user_id, order_id = %order_id, "Order update failed, wallet purchase rolled back");
                Err(WalletError::OrderUpdateFailed)
            }
        }
    }
}

/// Append an entry, turning every non-applied outcome into an error.
pub(crate) async fn append(
    repo: &Arc<dyn Repository>,
    entry: NewWalletEntry,
) -> Result<WalletTransaction, WalletError> {
    match repo.append_entry(entry).await? {
        WalletEntryOutcome::Applied(row) => Ok(row),
        WalletEntryOutcome::Duplicate { .. } => Err(WalletError::DuplicateReference),
        WalletEntryOutcome::InsufficientBalance { balance } => {
            Err(WalletError::InsufficientBalance { balance })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::OrderRepository;
    use crate::testing::{InMemoryRepository, sample_order};

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn setup() -> (Arc<InMemoryRepository>, WalletService, Uuid) {
        let repo = Arc::new(InMemoryRepository::new());
        let user = repo.add_user("buyer@example.com");
        let service = WalletService::new(repo.clone());
        (repo, service, user)
    }

    fn pending_order_for(repo: &InMemoryRepository, user: Uuid, amount: Decimal) -> Uuid {
        let mut order = sample_order(OrderStatus::Pending, amount);
        order.user_id = Some(user);
        repo.insert_order(order).id
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(Some(d("0.01"))).is_ok());
        assert!(validate_amount(Some(d("5.50"))).is_ok());
        assert!(validate_amount(Some(d("0"))).is_err());
        assert!(validate_amount(Some(d("-1"))).is_err());
        assert!(validate_amount(Some(d("1.005"))).is_err());
        assert!(validate_amount(None).is_err());
    }

    #[tokio::test]
    async fn test_topup_then_purchase() {
        let (repo, service, user) = setup();
        service.topup(user, Some(d("20.00"))).await.unwrap();
        let order_id = pending_order_for(&repo, user, d("7.50"));

        let row = service
            .purchase(user, Some(d("7.50")), Some(order_id))
            .await
            .unwrap();
        assert_eq!(row.amount, d("-7.50"));
        assert_eq!(row.balance_after, d("12.50"));
        assert_eq!(row.order_id, Some(order_id));
        assert_eq!(service.balance(user).await.unwrap(), d("12.50"));

        let order = repo.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.payment_method.as_deref(), Some("wallet"));
    }

    #[tokio::test]
    async fn test_purchase_over_balance_writes_nothing() {
        let (repo, service, user) = setup();
        service.topup(user, Some(d("5.00"))).await.unwrap();
        let order_id = pending_order_for(&repo, user, d("9.99"));

        let err = service
            .purchase(user, Some(d("9.99")), Some(order_id))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientBalance { .. }));
        assert_eq!(repo.ledger(user).len(), 1);
        assert_eq!(
            repo.get_order(order_id).await.unwrap().unwrap().status,
            OrderStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_purchase_of_foreign_order_is_rejected() {
        let (repo, service, user) = setup();
        let other = repo.add_user("other@example.com");
        service.topup(user, Some(d("50.00"))).await.unwrap();
        let order_id = pending_order_for(&repo, other, d("10.00"));

        let err = service
            .purchase(user, Some(d("10.00")), Some(order_id))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::NotOwner));
        assert_eq!(repo.ledger(user).len(), 1);
        assert_eq!(
            repo.get_order(order_id).await.unwrap().unwrap().status,
            OrderStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_purchase_validation_errors() {
        let (repo, service, user) = setup();
        service.topup(user, Some(d("50.00"))).await.unwrap();

        assert!(matches!(
            service.purchase(user, Some(d("1.00")), None).await,
            Err(WalletError::MissingOrderId)
        ));
        assert!(matches!(
            service.purchase(user, Some(d("1.00")), Some(Uuid::new_v4())).await,
            Err(WalletError::OrderNotFound)
        ));

        let order_id = pending_order_for(&repo, user, d("10.00"));
        assert!(matches!(
            service.purchase(user, Some(d("9.00")), Some(order_id)).await,
            Err(WalletError::AmountMismatch { .. })
        ));

        service
            .purchase(user, Some(d("10.00")), Some(order_id))
            .await
            .unwrap();
        assert!(matches!(
            service.purchase(user, Some(d("10.00")), Some(order_id)).await,
            Err(WalletError::OrderNotPending(OrderStatus::Paid))
        ));
        assert_eq!(service.balance(user).await.unwrap(), d("40.00"));
    }

    #[tokio::test]
    async fn test_failed_order_update_rolls_back_debit() {
        let (repo, service, user) = setup();
        service.topup(user, Some(d("30.00"))).await.unwrap();
        let order_id = pending_order_for(&repo, user, d("10.00"));
        repo.fail_next_paid_update();

        let err = service
            .purchase(user, Some(d("10.00")), Some(order_id))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::OrderUpdateFailed));
        assert_eq!(
            err.to_string(),
            "Order update failed; payment was not applied"
        );
        assert_eq!(service.balance(user).await.unwrap(), d("30.00"));
        assert_eq!(repo.ledger(user).len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_rows_chain() {
        let (repo, service, user) = setup();
        service.topup(user, Some(d("10.00"))).await.unwrap();
        service.topup(user, Some(d("2.25"))).await.unwrap();
        let order_id = pending_order_for(&repo, user, d("4.00"));
        service
            .purchase(user, Some(d("4.00")), Some(order_id))
            .await
            .unwrap();

        let rows = repo.ledger(user);
        let mut expected_before = Decimal::ZERO;
        for row in &rows {
            assert_eq!(row.balance_before, expected_before);
            assert_eq!(row.balance_after, row.balance_before + row.amount);
            expected_before = row.balance_after;
        }
        let total: Decimal = rows.iter().map(|r| r.amount).sum();
        assert_eq!(service.balance(user).await.unwrap(), total);
        assert_eq!(total, d("8.25"));
    }
}
