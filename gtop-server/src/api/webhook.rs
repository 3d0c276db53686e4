//! Payment confirmation endpoints.
//!
//! - `POST /functions/v1/payment-webhook/{target}`: payment gateway, webhook secret
//! - `POST /internal/auto-confirm/{target}`: loopback peers holding the
//!   internal secret; every call is audited
//!
//! Once authenticated the reply is always `200` with `{status, message}`,
//! whatever happened internally. Orders left behind by a storage failure are
//! picked up by the reconciler.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use gtop_sdk::objects::{PaymentWebhookPayload, WebhookReply};

use crate::api::extractors::{InternalAuth, LoopbackPeer, WebhookAuth};
use crate::state::AppState;

/// Lenient body parsing: an empty body is an empty payload.
fn parse_payload(body: &[u8]) -> Result<PaymentWebhookPayload, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PaymentWebhookPayload::default());
    }
    serde_json::from_slice(body)
}

async fn handle(state: &AppState, target: &str, body: &[u8]) -> Json<WebhookReply> {
    let payload = match parse_payload(body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(webhook_target = %target, error = %e, "Unparseable webhook body");
            return Json(WebhookReply::error("Invalid payload"));
        }
    };

    match state.webhooks.handle(target, &payload).await {
        Ok(reply) => {
            tracing::info!(webhook_target = %target, status = ?reply.status, message = %reply.message, "Webhook handled");
            Json(reply)
        }
        Err(e) => {
            tracing::error!(webhook_target = %target, error = %e, "Webhook handling failed");
            Json(WebhookReply::error("Internal error"))
        }
    }
}

/// `POST /functions/v1/payment-webhook/{target}`
pub async fn payment_webhook(
    State(state): State<AppState>,
    _auth: WebhookAuth,
    Path(target): Path<String>,
    body: Bytes,
) -> Json<WebhookReply> {
    handle(&state, &target, &body).await
}

/// `POST /internal/auto-confirm/{target}`
pub async fn auto_confirm(
    State(state): State<AppState>,
    LoopbackPeer(peer): LoopbackPeer,
    _auth: InternalAuth,
    Path(target): Path<String>,
    body: Bytes,
) -> Json<WebhookReply> {
    tracing::warn!(peer = %peer, webhook_target = %target, audit = true, "Auto-confirm used");
    handle(&state, &target, &body).await
}
