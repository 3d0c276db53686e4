//! Order creation from the catalog and order status reads.

use crate::entities::orders::{NewOrder, OrderRecord};
use crate::repository::Repository;
use crate::utils::unix_timestamp;
use gtop_sdk::objects::{CreateOrderRequest, OrderResponse};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_PLAYER_ID_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Package not found")]
    PackageNotFound,

    #[error("Invalid player ID")]
    InvalidPlayerId,

    #[error("Order not found")]
    OrderNotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<&OrderRecord> for OrderResponse {
    fn from(order: &OrderRecord) -> Self {
        Self {
            id: order.id,
            game_name: order.game_name.clone(),
            package_name: order.package_name.clone(),
            player_id: order.player_id.clone(),
            server_id: order.server_id.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            payment_method: order.payment_method.clone(),
            status: order.status.into(),
            status_message: order.status_message.clone(),
            delivery_items: order.delivery_items.clone(),
            created_at: unix_timestamp(order.created_at),
            updated_at: unix_timestamp(order.updated_at),
        }
    }
}

pub struct CheckoutService {
    repo: Arc<dyn Repository>,
}

impl CheckoutService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Create a `pending` order priced from the catalog.
    ///
    /// A package without a provider link can still be sold; its dispatch
    /// fails later and the order lands in `pending_manual`.
    pub async fn create_order(
        &self,
        user_id: Option<Uuid>,
        request: CreateOrderRequest,
    ) -> Result<OrderRecord, CheckoutError> {
        let player_id = request.player_id.trim();
        if player_id.is_empty() || player_id.len() > MAX_PLAYER_ID_LEN {
            return Err(CheckoutError::InvalidPlayerId);
        }

        let package = self
            .repo
            .get_package(request.package_id)
            .await?
            .filter(|p| p.active)
            .ok_or(CheckoutError::PackageNotFound)?;
        let link = self.repo.get_product_link(package.id).await?;
        if link.is_none() {
            warn!(package_id = %package.id, "Package has no provider product link");
        }

        let order = self
            .repo
            .create_order(NewOrder {
                user_id,
                package_id: Some(package.id),
                game_name: package.game_name,
                package_name: package.name,
                player_id: player_id.to_string(),
                server_id: request
                    .server_id
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
                amount: package.price,
                currency: package.currency,
                payment_method: request.payment_method,
                provider_product_id: link.as_ref().map(|l| l.provider_product_id.clone()),
                provider_type_id: link.map(|l| l.provider_type_id),
            })
            .await?;
        info!(order_id = %order.id, package_id = %package.id, amount = %order.amount, "Order created");
        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderRecord, CheckoutError> {
        self.repo
            .get_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::OrderStatus;
    use crate::entities::product_links::UpsertProductLink;
    use crate::repository::CatalogRepository;
    use crate::testing::InMemoryRepository;
    use gtop_sdk::objects::OrderStatus as SdkOrderStatus;
    use rust_decimal::Decimal;

    fn request(package_id: Uuid) -> CreateOrderRequest {
        CreateOrderRequest {
            package_id,
            player_id: " 12345678 ".to_string(),
            server_id: Some("2001".to_string()),
            payment_method: Some("khqr".to_string()),
        }
    }

    #[tokio::test]
    async fn test_price_comes_from_catalog() {
        let repo = Arc::new(InMemoryRepository::new());
        let package = repo.add_package("Mobile Legends", "86 Diamonds", Decimal::new(150, 2));
        repo.upsert_product_link(UpsertProductLink {
            package_id: package,
            provider_product_id: "P1".to_string(),
            provider_type_id: "T1".to_string(),
        })
        .await
        .unwrap();
        let service = CheckoutService::new(repo);

        let order = service.create_order(None, request(package)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.amount, Decimal::new(150, 2));
        assert_eq!(order.player_id, "12345678");
        assert_eq!(order.provider_product_id.as_deref(), Some("P1"));
        assert_eq!(order.provider_type_id.as_deref(), Some("T1"));

        let view = OrderResponse::from(&service.get_order(order.id).await.unwrap());
        assert_eq!(view.status, SdkOrderStatus::Pending);
        assert_eq!(view.package_name, "86 Diamonds");
    }

    #[tokio::test]
    async fn test_unknown_package_and_bad_player() {
        let repo = Arc::new(InMemoryRepository::new());
        let package = repo.add_package("PUBG", "60 UC", Decimal::ONE);
        let service = CheckoutService::new(repo);

        assert!(matches!(
            service.create_order(None, request(Uuid::new_v4())).await,
            Err(CheckoutError::PackageNotFound)
        ));

        let mut bad = request(package);
        bad.player_id = "   ".to_string();
        assert!(matches!(
            service.create_order(None, bad).await,
            Err(CheckoutError::InvalidPlayerId)
        ));

        // no product link is allowed
        let order = service.create_order(None, request(package)).await.unwrap();
        assert_eq!(order.provider_product_id, None);
    }
}
