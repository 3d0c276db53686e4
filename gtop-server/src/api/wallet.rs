use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use gtop_sdk::objects::{BalanceResponse, WalletMutationResponse, WalletRequest};

use crate::api::error::ApiError;
use crate::api::extractors::{ApiJson, BearerUser};
use crate::state::AppState;

/// `POST /functions/v1/wallet`: balance, top-up and order purchase for the
/// signed-in user.
pub async fn wallet(
    State(state): State<AppState>,
    BearerUser(user): BearerUser,
    ApiJson(request): ApiJson<WalletRequest>,
) -> Result<Response, ApiError> {
    let response = match request {
        WalletRequest::GetBalance => Json(BalanceResponse {
            balance: state.wallet.balance(user.user_id).await?,
        })
        .into_response(),
        WalletRequest::Topup { amount } => {
            let row = state.wallet.topup(user.user_id, amount).await?;
            Json(WalletMutationResponse {
                success: true,
                new_balance: row.balance_after,
                order_id: None,
            })
            .into_response()
        }
        WalletRequest::Purchase { amount, order_id } => {
            let row = state.wallet.purchase(user.user_id, amount, order_id).await?;
            Json(WalletMutationResponse {
                success: true,
                new_balance: row.balance_after,
                order_id: row.order_id,
            })
            .into_response()
        }
    };
    Ok(response)
}
