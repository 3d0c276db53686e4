//! Storage seams used by services and background processors.
//!
//! Each trait groups the statements one area of the gateway needs. The
//! production implementation is [`DatabaseProcessor`], which delegates to the
//! `kanau` processors in [`crate::entities`] and wraps multi-statement units
//! of work in a single transaction. An in-memory implementation for tests
//! lives in `crate::testing` behind the `testing` feature.

use crate::entities::notification_outbox::{
    ListDueNotifications, MarkNotificationDelivered, OutboxEntry, RescheduleNotification,
};
use crate::entities::orders::{
    ClaimOrderForProcessing, GetOrderById, ListOrphanedOrders, ListStuckOrders, NewOrder,
    OrderRecord,
    OrderTransition, SetProviderOrderId, StoreDeliveryItems,
};
use crate::entities::packages::{GetPackageById, Package};
use crate::entities::product_links::{
    GetProductLink, ListProductLinks, ProductLink, UpsertProductLink,
};
use crate::entities::users::{FindSession, FindUsersByIdPrefix, SessionUser, UserExists};
use crate::entities::verification_configs::{GetVerificationConfig, VerificationConfig};
use crate::entities::wallet_transactions::{
    GetWalletBalance, ListUserBalances, NewWalletEntry, UserBalance, WalletTransaction,
};
use crate::entities::{LedgerEntryType, OrderStatus};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use time::PrimitiveDateTime;
use uuid::Uuid;

/// Result of appending a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEntryOutcome {
    /// The row was written.
    Applied(WalletTransaction),
    /// A row with the same `reference_id` already exists; nothing was written.
    Duplicate { balance: Decimal },
    /// The entry would take the balance below zero; nothing was written.
    InsufficientBalance { balance: Decimal },
}

/// Paying a pending order from the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPurchase {
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
}

/// Result of [`WalletRepository::purchase_order`]. Every variant except
/// `Paid` means the transaction was rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Paid(WalletTransaction),
    OrderNotFound,
    NotOwner,
    NotPending(OrderStatus),
    AmountMismatch { expected: Decimal },
    InsufficientBalance { balance: Decimal },
    /// The final conditional update of the order touched no row.
    OrderUpdateFailed,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, order: NewOrder) -> Result<OrderRecord, sqlx::Error>;
    async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderRecord>, sqlx::Error>;
    /// Atomic `pending|paid -> processing`. `None` when nothing was claimed.
    async fn claim_order(
        &self,
        claim: ClaimOrderForProcessing,
    ) -> Result<Option<OrderRecord>, sqlx::Error>;
    /// Compare-and-set one state machine edge. Terminal targets enqueue an
    /// outbox notification atomically with the change.
    async fn transition_order(
        &self,
        transition: OrderTransition,
    ) -> Result<Option<OrderRecord>, sqlx::Error>;
    async fn set_provider_order_id(
        &self,
        order_id: Uuid,
        provider_order_id: String,
    ) -> Result<(), sqlx::Error>;
    async fn store_delivery_items(
        &self,
        order_id: Uuid,
        delivery_items: Vec<String>,
    ) -> Result<(), sqlx::Error>;
    async fn list_stuck_orders(&self, limit: i64) -> Result<Vec<OrderRecord>, sqlx::Error>;
    /// `processing` orders without a provider order id, untouched since
    /// `updated_before`.
    async fn list_orphaned_orders(
        &self,
        updated_before: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<OrderRecord>, sqlx::Error>;
}

#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> Result<Decimal, sqlx::Error>;
    /// Append one entry under the per-user lock.
    async fn append_entry(&self, entry: NewWalletEntry)
    -> Result<WalletEntryOutcome, sqlx::Error>;
    /// Debit the wallet and mark the order paid in one transaction.
    async fn purchase_order(&self, purchase: OrderPurchase)
    -> Result<PurchaseOutcome, sqlx::Error>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_session(&self, token_hash: Vec<u8>) -> Result<Option<SessionUser>, sqlx::Error>;
    /// At most two matches, enough to detect ambiguity.
    async fn find_users_by_id_prefix(&self, prefix: &str) -> Result<Vec<Uuid>, sqlx::Error>;
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, sqlx::Error>;
    async fn list_user_balances(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserBalance>, sqlx::Error>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get_package(&self, package_id: Uuid) -> Result<Option<Package>, sqlx::Error>;
    async fn get_product_link(&self, package_id: Uuid)
    -> Result<Option<ProductLink>, sqlx::Error>;
    async fn upsert_product_link(
        &self,
        link: UpsertProductLink,
    ) -> Result<ProductLink, sqlx::Error>;
    async fn list_product_links(&self) -> Result<Vec<ProductLink>, sqlx::Error>;
    async fn get_verification_config(
        &self,
        game_name: &str,
    ) -> Result<Option<VerificationConfig>, sqlx::Error>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn due_notifications(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<OutboxEntry>, sqlx::Error>;
    async fn mark_notification_delivered(&self, id: i64) -> Result<(), sqlx::Error>;
    async fn reschedule_notification(
        &self,
        id: i64,
        delay_secs: i64,
        error: String,
    ) -> Result<(), sqlx::Error>;
}

/// Everything the gateway stores.
pub trait Repository:
    OrderRepository + WalletRepository + AccountRepository + CatalogRepository + OutboxRepository
{
}

impl<T> Repository for T where
    T: OrderRepository
        + WalletRepository
        + AccountRepository
        + CatalogRepository
        + OutboxRepository
{
}

#[async_trait]
impl OrderRepository for DatabaseProcessor {
    async fn create_order(&self, order: NewOrder) -> Result<OrderRecord, sqlx::Error> {
        self.process(order).await
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderRecord>, sqlx::Error> {
        self.process(GetOrderById { order_id }).await
    }

    async fn claim_order(
        &self,
        claim: ClaimOrderForProcessing,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        self.process(claim).await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:TransitionOrder", fields(order_id = %transition.order_id))]
    async fn transition_order(
        &self,
        transition: OrderTransition,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        let mut tx = self.begin().await?;
        let updated = OrderRecord::transition_tx(&mut tx, &transition).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn set_provider_order_id(
        &self,
        order_id: Uuid,
        provider_order_id: String,
    ) -> Result<(), sqlx::Error> {
        self.process(SetProviderOrderId {
            order_id,
            provider_order_id,
        })
        .await
    }

    async fn store_delivery_items(
        &self,
        order_id: Uuid,
        delivery_items: Vec<String>,
    ) -> Result<(), sqlx::Error> {
        self.process(StoreDeliveryItems {
            order_id,
            delivery_items,
        })
        .await
    }

    async fn list_stuck_orders(&self, limit: i64) -> Result<Vec<OrderRecord>, sqlx::Error> {
        self.process(ListStuckOrders { limit }).await
    }

    async fn list_orphaned_orders(
        &self,
        updated_before: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<OrderRecord>, sqlx::Error> {
        self.process(ListOrphanedOrders {
            updated_before,
            limit,
        })
        .await
    }
}

#[async_trait]
impl WalletRepository for DatabaseProcessor {
    async fn balance(&self, user_id: Uuid) -> Result<Decimal, sqlx::Error> {
        self.process(GetWalletBalance { user_id }).await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:AppendWalletEntry", fields(user_id = %entry.user_id))]
    async fn append_entry(
        &self,
        entry: NewWalletEntry,
    ) -> Result<WalletEntryOutcome, sqlx::Error> {
        let mut tx = self.begin().await?;
        WalletTransaction::lock_user_tx(&mut tx, entry.user_id).await?;
        let balance = WalletTransaction::latest_balance_tx(&mut tx, entry.user_id).await?;

        let Some(draft) = entry.draft(balance) else {
            tx.rollback().await?;
            return Ok(WalletEntryOutcome::InsufficientBalance { balance });
        };

        match WalletTransaction::insert_tx(&mut tx, &draft).await? {
            Some(row) => {
                tx.commit().await?;
                Ok(WalletEntryOutcome::Applied(row))
            }
            None => {
                tx.rollback().await?;
                Ok(WalletEntryOutcome::Duplicate { balance })
            }
        }
    }

    #[tracing::instrument(skip_all, err, name = "SQL:PurchaseOrder", fields(order_id = %purchase.order_id))]
    async fn purchase_order(
        &self,
        purchase: OrderPurchase,
    ) -> Result<PurchaseOutcome, sqlx::Error> {
        let mut tx = self.begin().await?;
        WalletTransaction::lock_user_tx(&mut tx, purchase.user_id).await?;

        let order = OrderRecord::get_for_update_tx(&mut tx, purchase.order_id).await?;
        let balance = WalletTransaction::latest_balance_tx(&mut tx, purchase.user_id).await?;
        let entry = match check_purchase(&purchase, order.as_ref(), balance) {
            Ok(entry) => entry,
            Err(outcome) => {
                tx.rollback().await?;
                return Ok(outcome);
            }
        };
        let Some(draft) = entry.draft(balance) else {
            tx.rollback().await?;
            return Ok(PurchaseOutcome::InsufficientBalance { balance });
        };
        let Some(row) = WalletTransaction::insert_tx(&mut tx, &draft).await? else {
            tx.rollback().await?;
            return Ok(PurchaseOutcome::OrderUpdateFailed);
        };

        let affected =
            OrderRecord::mark_paid_by_wallet_tx(&mut tx, purchase.order_id, purchase.user_id)
                .await?;
        if affected == 0 {
            tx.rollback().await?;
            return Ok(PurchaseOutcome::OrderUpdateFailed);
        }

        tx.commit().await?;
        Ok(PurchaseOutcome::Paid(row))
    }
}

/// Validate a wallet purchase against the locked order row and the current
/// balance, producing the ledger entry to write.
pub fn check_purchase(
    purchase: &OrderPurchase,
    order: Option<&OrderRecord>,
    balance: Decimal,
) -> Result<NewWalletEntry, PurchaseOutcome> {
    let order = order.ok_or(PurchaseOutcome::OrderNotFound)?;
    if order.user_id != Some(purchase.user_id) {
        return Err(PurchaseOutcome::NotOwner);
    }
    if order.status != OrderStatus::Pending {
        return Err(PurchaseOutcome::NotPending(order.status));
    }
    if order.amount != purchase.amount {
        return Err(PurchaseOutcome::AmountMismatch {
            expected: order.amount,
        });
    }
    if balance < purchase.amount {
        return Err(PurchaseOutcome::InsufficientBalance { balance });
    }
    Ok(NewWalletEntry {
        user_id: purchase.user_id,
        entry_type: LedgerEntryType::Purchase,
        amount: -purchase.amount,
        order_id: Some(order.id),
        reference_id: Some(format!("order-{}", order.id)),
        description: format!("Purchase: {} {}", order.game_name, order.package_name),
    })
}

#[async_trait]
impl AccountRepository for DatabaseProcessor {
    async fn find_session(&self, token_hash: Vec<u8>) -> Result<Option<SessionUser>, sqlx::Error> {
        self.process(FindSession { token_hash }).await
    }

    async fn find_users_by_id_prefix(&self, prefix: &str) -> Result<Vec<Uuid>, sqlx::Error> {
        self.process(FindUsersByIdPrefix {
            prefix: prefix.to_string(),
        })
        .await
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        self.process(UserExists { user_id }).await
    }

    async fn list_user_balances(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserBalance>, sqlx::Error> {
        self.process(ListUserBalances { limit, offset }).await
    }
}

#[async_trait]
impl CatalogRepository for DatabaseProcessor {
    async fn get_package(&self, package_id: Uuid) -> Result<Option<Package>, sqlx::Error> {
        self.process(GetPackageById { package_id }).await
    }

    async fn get_product_link(
        &self,
        package_id: Uuid,
    ) -> Result<Option<ProductLink>, sqlx::Error> {
        self.process(GetProductLink { package_id }).await
    }

    async fn upsert_product_link(
        &self,
        link: UpsertProductLink,
    ) -> Result<ProductLink, sqlx::Error> {
        self.process(link).await
    }

    async fn list_product_links(&self) -> Result<Vec<ProductLink>, sqlx::Error> {
        self.process(ListProductLinks).await
    }

    async fn get_verification_config(
        &self,
        game_name: &str,
    ) -> Result<Option<VerificationConfig>, sqlx::Error> {
        self.process(GetVerificationConfig {
            game_name: game_name.to_string(),
        })
        .await
    }
}

#[async_trait]
impl OutboxRepository for DatabaseProcessor {
    async fn due_notifications(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<OutboxEntry>, sqlx::Error> {
        self.process(ListDueNotifications {
            limit,
            max_attempts,
        })
        .await
    }

    async fn mark_notification_delivered(&self, id: i64) -> Result<(), sqlx::Error> {
        self.process(MarkNotificationDelivered { id }).await
    }

    async fn reschedule_notification(
        &self,
        id: i64,
        delay_secs: i64,
        error: String,
    ) -> Result<(), sqlx::Error> {
        self.process(RescheduleNotification {
            id,
            delay_secs,
            error,
        })
        .await
    }
}
