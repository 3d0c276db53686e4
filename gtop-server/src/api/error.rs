//! Mapping of service errors onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gtop_core::processors::FulfillmentError;
use gtop_core::services::{CatalogError, CheckoutError, VerificationError, WalletError};
use gtop_sdk::objects::ErrorResponse;

/// Errors that can occur in API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Wallet(e) => match e {
                WalletError::InvalidAmount
                | WalletError::MissingOrderId
                | WalletError::InsufficientBalance { .. }
                | WalletError::OrderNotPending(_)
                | WalletError::AmountMismatch { .. }
                | WalletError::DuplicateReference => StatusCode::BAD_REQUEST,
                WalletError::NotOwner => StatusCode::FORBIDDEN,
                WalletError::OrderNotFound | WalletError::UserNotFound => StatusCode::NOT_FOUND,
                WalletError::OrderUpdateFailed => StatusCode::CONFLICT,
                WalletError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Catalog(e) => match e {
                CatalogError::InvalidLink => StatusCode::BAD_REQUEST,
                CatalogError::PackageNotFound => StatusCode::NOT_FOUND,
                CatalogError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Checkout(e) => match e {
                CheckoutError::InvalidPlayerId => StatusCode::BAD_REQUEST,
                CheckoutError::PackageNotFound | CheckoutError::OrderNotFound => {
                    StatusCode::NOT_FOUND
                }
                CheckoutError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Verification(e) => match e {
                VerificationError::ZoneRequired | VerificationError::MissingPlayerId => {
                    StatusCode::BAD_REQUEST
                }
                VerificationError::UnknownGame => StatusCode::NOT_FOUND,
                VerificationError::Provider(_) => StatusCode::BAD_GATEWAY,
                VerificationError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Fulfillment(e) => match e {
                FulfillmentError::NotProcessing { .. } => StatusCode::BAD_REQUEST,
                FulfillmentError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                FulfillmentError::MissingProductLink(_) => StatusCode::UNPROCESSABLE_ENTITY,
                FulfillmentError::Provider(_) => StatusCode::BAD_GATEWAY,
                FulfillmentError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "API request failed");
            match status {
                StatusCode::BAD_GATEWAY => "Provider request failed".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
