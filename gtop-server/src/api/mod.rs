//! HTTP API.
//!
//! # Endpoints
//!
//! - `POST /functions/v1/payment-webhook/{target}` – payment confirmation (webhook secret)
//! - `POST /internal/auto-confirm/{target}`        – payment confirmation (loopback + internal secret)
//! - `POST /functions/v1/wallet`                   – wallet actions (user session)
//! - `POST /functions/v1/admin-wallet`             – wallet adjustments (admin session)
//! - `POST /functions/v1/admin-products`           – provider product links (admin session)
//! - `POST /functions/v1/g2bulk-fulfill`           – dispatch / reconcile (internal secret)
//! - `POST /functions/v1/verify-player`            – player id check
//! - `POST /functions/v1/orders`                   – create order (optional session)
//! - `GET  /functions/v1/orders/{id}`              – order view

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

mod admin;
mod error;
pub mod extractors;
mod fulfillment;
mod orders;
mod verification;
mod wallet;
mod webhook;


/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/functions/v1/payment-webhook/{target}",
            post(webhook::payment_webhook),
        )
        .route("/internal/auto-confirm/{target}", post(webhook::auto_confirm))
        .route("/functions/v1/wallet", post(wallet::wallet))
        .route("/functions/v1/admin-wallet", post(admin::admin_wallet))
        .route("/functions/v1/admin-products", post(admin::admin_products))
        .route("/functions/v1/g2bulk-fulfill", post(fulfillment::fulfill))
        .route(
            "/functions/v1/verify-player",
            post(verification::verify_player),
        )
        .route("/functions/v1/orders", post(orders::create_order))
        .route("/functions/v1/orders/{order_id}", get(orders::get_order))
}
