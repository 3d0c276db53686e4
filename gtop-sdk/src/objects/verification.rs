//! Player id verification bodies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPlayerRequest {
    pub game_name: String,
    pub player_id: String,
    #[serde(default)]
    pub server_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPlayerResponse {
    pub valid: bool,
    pub player_name: Option<String>,
    pub message: String,
}
