//! Storefront order endpoints.
//!
//! - `POST /functions/v1/orders`: create a `pending` order; guests allowed
//! - `GET  /functions/v1/orders/{id}`: order status view

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use gtop_sdk::objects::{CreateOrderRequest, OrderResponse};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extractors::{ApiJson, BearerUser};
use crate::state::AppState;

pub async fn create_order(
    State(state): State<AppState>,
    user: Option<BearerUser>,
    ApiJson(request): ApiJson<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.map(|BearerUser(u)| u.user_id);
    let order = state.checkout.create_order(user_id, request).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.checkout.get_order(order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}
