use axum::{Json, extract::State};
use gtop_sdk::objects::{VerifyPlayerRequest, VerifyPlayerResponse};

use crate::api::error::ApiError;
use crate::api::extractors::ApiJson;
use crate::state::AppState;

/// `POST /functions/v1/verify-player`
pub async fn verify_player(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<VerifyPlayerRequest>,
) -> Result<Json<VerifyPlayerResponse>, ApiError> {
    let result = state
        .verifier
        .verify(
            &request.game_name,
            &request.player_id,
            request.server_id.as_deref(),
        )
        .await?;
    Ok(Json(VerifyPlayerResponse {
        valid: result.valid,
        player_name: result.player_name,
        message: result.message,
    }))
}
