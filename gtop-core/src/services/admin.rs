//! Admin wallet adjustments and provider product links.

use crate::entities::LedgerEntryType;
use crate::entities::product_links::{ProductLink, UpsertProductLink};
use crate::entities::wallet_transactions::{NewWalletEntry, UserBalance, WalletTransaction};
use crate::repository::Repository;
use crate::services::wallet::{WalletError, append, validate_amount};
use gtop_sdk::objects::clamp_pagination;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

const DEFAULT_DESCRIPTION: &str = "Admin adjustment";

/// Direction of a manual balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Add,
    Deduct,
}

/// `"<description> (by admin <id>)"`, falling back to a default text.
pub fn attributed_description(description: Option<&str>, admin_id: Uuid) -> String {
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DESCRIPTION);
    format!("{description} (by admin {admin_id})")
}

/// Ledger reference for an admin action:
/// `admin-<adminId>-<unix_millis>-<nonce>`, where the nonce is the leading
/// 8 hex digits of `nonce`. Ledger references are unique, so two actions in
/// the same millisecond must still differ.
pub fn admin_reference(admin_id: Uuid, at: OffsetDateTime, nonce: Uuid) -> String {
    let millis = at.unix_timestamp_nanos() / 1_000_000;
    let tag = (nonce.as_u128() >> 96) as u32;
    format!("admin-{admin_id}-{millis}-{tag:08x}")
}

pub struct AdminWalletService {
    repo: Arc<dyn Repository>,
}

impl AdminWalletService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<UserBalance>, WalletError> {
        let (limit, offset) = clamp_pagination(limit, offset);
        Ok(self.repo.list_user_balances(limit, offset).await?)
    }

    /// Credit or debit `target_user_id`. Debits never take the balance
    /// below zero.
    pub async fn adjust(
        &self,
        admin_id: Uuid,
        target_user_id: Uuid,
        direction: Adjustment,
        amount: Option<Decimal>,
        description: Option<&str>,
    ) -> Result<WalletTransaction, WalletError> {
        let amount = validate_amount(amount)?;
        if !self.repo.user_exists(target_user_id).await? {
            return Err(WalletError::UserNotFound);
        }

        let (entry_type, signed) = match direction {
            Adjustment::Add => (LedgerEntryType::Topup, amount),
            Adjustment::Deduct => (LedgerEntryType::Purchase, -amount),
        };
        let row = append(
            &self.repo,
            NewWalletEntry {
                user_id: target_user_id,
                entry_type,
                amount: signed,
                order_id: None,
                reference_id: Some(admin_reference(admin_id, OffsetDateTime::now_utc(), Uuid::new_v4())),
                description: attributed_description(description, admin_id),
            },
        )
        .await?;

        info!(
            admin_id = %admin_id,
            target_user_id = %target_user_id,
            amount = %signed,
            balance = %row.balance_after,
            "Admin wallet adjustment"
        );
        Ok(row)
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Package not found")]
    PackageNotFound,

    #[error("Product and type ids are required")]
    InvalidLink,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct ProductLinkService {
    repo: Arc<dyn Repository>,
}

impl ProductLinkService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> Result<Vec<ProductLink>, CatalogError> {
        Ok(self.repo.list_product_links().await?)
    }

    pub async fn link(
        &self,
        package_id: Uuid,
        product_id: &str,
        type_id: &str,
    ) -> Result<ProductLink, CatalogError> {
        let (product_id, type_id) = (product_id.trim(), type_id.trim());
        if product_id.is_empty() || type_id.is_empty() {
            return Err(CatalogError::InvalidLink);
        }
        if self.repo.get_package(package_id).await?.is_none() {
            return Err(CatalogError::PackageNotFound);
        }
        let link = self
            .repo
            .upsert_product_link(UpsertProductLink {
                package_id,
                provider_product_id: product_id.to_string(),
                provider_type_id: type_id.to_string(),
            })
            .await?;
        info!(package_id = %package_id, product_id, type_id, "Provider product linked");
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryRepository;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_attributed_description() {
        let admin = Uuid::nil();
        assert_eq!(
            attributed_description(None, admin),
            format!("Admin adjustment (by admin {admin})")
        );
        assert_eq!(
            attributed_description(Some("  "), admin),
            format!("Admin adjustment (by admin {admin})")
        );
        assert_eq!(
            attributed_description(Some("Refund for #12"), admin),
            format!("Refund for #12 (by admin {admin})")
        );
    }

    #[test]
    fn test_admin_reference_uses_millis() {
        let at = OffsetDateTime::from_unix_timestamp_nanos(1_700_000_000_123_456_789).unwrap();
        let nonce = Uuid::from_u128(0xdeadbeef_0000_0000_0000_000000000001);
        assert_eq!(
            admin_reference(Uuid::nil(), at, nonce),
            format!("admin-{}-1700000000123-deadbeef", Uuid::nil())
        );
        assert_ne!(
            admin_reference(Uuid::nil(), at, nonce),
            admin_reference(Uuid::nil(), at, Uuid::from_u128(1))
        );
    }

    #[tokio::test]
    async fn test_add_then_deduct() {
        let repo = Arc::new(InMemoryRepository::new());
        let admin = repo.add_user("admin@example.com");
        let target = repo.add_user("user@example.com");
        let service = AdminWalletService::new(repo.clone());

        let row = service
            .adjust(admin, target, Adjustment::Add, Some(d("15.00")), Some("Promo"))
            .await
            .unwrap();
        assert_eq!(row.entry_type, LedgerEntryType::Topup);
        assert_eq!(row.description, format!("Promo (by admin {admin})"));
        assert!(row.reference_id.unwrap().starts_with(&format!("admin-{admin}-")));

        let row = service
            .adjust(admin, target, Adjustment::Deduct, Some(d("5.00")), None)
            .await
            .unwrap();
        assert_eq!(row.entry_type, LedgerEntryType::Purchase);
        assert_eq!(row.amount, d("-5.00"));
        assert_eq!(row.balance_after, d("10.00"));

        let err = service
            .adjust(admin, target, Adjustment::Deduct, Some(d("10.01")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientBalance { .. }));
        assert_eq!(repo.ledger(target).len(), 2);
    }

    #[tokio::test]
    async fn test_back_to_back_adjustments_get_distinct_references() {
        let repo = Arc::new(InMemoryRepository::new());
        let admin = repo.add_user("admin@example.com");
        let target = repo.add_user("user@example.com");
        let service = AdminWalletService::new(repo.clone());

        for _ in 0..20 {
            service
                .adjust(admin, target, Adjustment::Add, Some(d("1.00")), None)
                .await
                .unwrap();
        }
        let rows = repo.ledger(target);
        assert_eq!(rows.len(), 20);
        let mut references: Vec<_> = rows.into_iter().filter_map(|r| r.reference_id).collect();
        references.sort();
        references.dedup();
        assert_eq!(references.len(), 20);
    }

    #[tokio::test]
    async fn test_unknown_target_user() {
        let repo = Arc::new(InMemoryRepository::new());
        let admin = repo.add_user("admin@example.com");
        let service = AdminWalletService::new(repo);

        let err = service
            .adjust(admin, Uuid::new_v4(), Adjustment::Add, Some(d("1")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::UserNotFound));
    }

    #[tokio::test]
    async fn test_list_users_reports_balances() {
        let repo = Arc::new(InMemoryRepository::new());
        let admin = repo.add_user("admin@example.com");
        let target = repo.add_user("user@example.com");
        let service = AdminWalletService::new(repo);
        service
            .adjust(admin, target, Adjustment::Add, Some(d("3.00")), None)
            .await
            .unwrap();

        let users = service.list_users(50, 0).await.unwrap();
        assert_eq!(users.len(), 2);
        let listed = users.iter().find(|u| u.user_id == target).unwrap();
        assert_eq!(listed.balance, d("3.00"));
    }

    #[tokio::test]
    async fn test_link_requires_existing_package() {
        let repo = Arc::new(InMemoryRepository::new());
        let package = repo.add_package("Mobile Legends", "86 Diamonds", d("1.50"));
        let service = ProductLinkService::new(repo);

        assert!(matches!(
            service.link(Uuid::new_v4(), "P1", "T1").await,
            Err(CatalogError::PackageNotFound)
        ));
        assert!(matches!(
            service.link(package, " ", "T1").await,
            Err(CatalogError::InvalidLink)
        ));

        service.link(package, "P1", "T1").await.unwrap();
        let link = service.link(package, "P2", "T2").await.unwrap();
        assert_eq!(link.provider_product_id, "P2");
        assert_eq!(service.list().await.unwrap().len(), 1);
    }
}
