//! Admin endpoints. Every handler requires a session holding the `admin`
//! role.
//!
//! - `POST /functions/v1/admin-wallet`: list users, add or deduct balance
//! - `POST /functions/v1/admin-products`: list and set provider product links

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use gtop_core::entities::product_links::ProductLink;
use gtop_core::services::Adjustment;
use gtop_core::utils::unix_timestamp;
use gtop_sdk::objects::{
    AdminAdjustmentResponse, AdminProductRequest, AdminUserResponse, AdminWalletRequest,
    ProductLinkResponse,
};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::extractors::{AdminUser, ApiJson};
use crate::state::AppState;

#[derive(Serialize)]
struct UsersResponse {
    users: Vec<AdminUserResponse>,
}

#[derive(Serialize)]
struct LinksResponse {
    links: Vec<ProductLinkResponse>,
}

fn link_to_response(link: &ProductLink) -> ProductLinkResponse {
    ProductLinkResponse {
        package_id: link.package_id,
        product_id: link.provider_product_id.clone(),
        type_id: link.provider_type_id.clone(),
        created_at: unix_timestamp(link.created_at),
    }
}

/// `POST /functions/v1/admin-wallet`
pub async fn admin_wallet(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(request): ApiJson<AdminWalletRequest>,
) -> Result<Response, ApiError> {
    let (target_user_id, direction, amount, description) = match request {
        AdminWalletRequest::ListUsers { limit, offset } => {
            let users = state.admin_wallet.list_users(limit, offset).await?;
            let users = users
                .into_iter()
                .map(|u| AdminUserResponse {
                    id: u.user_id,
                    email: u.email,
                    balance: u.balance,
                    created_at: unix_timestamp(u.created_at),
                })
                .collect();
            return Ok(Json(UsersResponse { users }).into_response());
        }
        AdminWalletRequest::AddBalance {
            target_user_id,
            amount,
            description,
        } => (target_user_id, Adjustment::Add, amount, description),
        AdminWalletRequest::DeductBalance {
            target_user_id,
            amount,
            description,
        } => (target_user_id, Adjustment::Deduct, amount, description),
    };

    let row = state
        .admin_wallet
        .adjust(
            admin.user_id,
            target_user_id,
            direction,
            amount,
            description.as_deref(),
        )
        .await?;
    Ok(Json(AdminAdjustmentResponse {
        success: true,
        new_balance: row.balance_after,
        transaction_id: row.id,
        reference_id: row.reference_id.unwrap_or_default(),
    })
    .into_response())
}

/// `POST /functions/v1/admin-products`
pub async fn admin_products(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(request): ApiJson<AdminProductRequest>,
) -> Result<Response, ApiError> {
    match request {
        AdminProductRequest::ListLinks => {
            let links = state.product_links.list().await?;
            Ok(Json(LinksResponse {
                links: links.iter().map(link_to_response).collect(),
            })
            .into_response())
        }
        AdminProductRequest::Link {
            package_id,
            product_id,
            type_id,
        } => {
            let link = state
                .product_links
                .link(package_id, &product_id, &type_id)
                .await?;
            tracing::info!(admin_id = %admin.user_id, package_id = %package_id, "Product link updated by admin");
            Ok(Json(link_to_response(&link)).into_response())
        }
    }
}
