use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use gtop_core::processors::{FulfillOrder, FulfillmentOutcome};
use gtop_sdk::objects::{FulfillRequest, FulfillResponse, OrderStatus, ReconcileReportResponse};
use kanau::processor::Processor;

use crate::api::error::ApiError;
use crate::api::extractors::{ApiJson, InternalAuth};
use crate::state::AppState;

/// `POST /functions/v1/g2bulk-fulfill`: dispatch one `processing` order, or
/// run a reconciler sweep right away.
pub async fn fulfill(
    State(state): State<AppState>,
    _auth: InternalAuth,
    ApiJson(request): ApiJson<FulfillRequest>,
) -> Result<Response, ApiError> {
    match request {
        FulfillRequest::Fulfill { order_id } => {
            let response = match state.dispatcher.process(FulfillOrder { order_id }).await? {
                FulfillmentOutcome::Dispatched(order) => FulfillResponse {
                    success: true,
                    order_id,
                    status: order.status.into(),
                    message: order.status_message,
                },
                FulfillmentOutcome::Parked { reason, .. } => FulfillResponse {
                    success: false,
                    order_id,
                    status: OrderStatus::PendingManual,
                    message: Some(reason),
                },
            };
            Ok(Json(response).into_response())
        }
        FulfillRequest::Poll => {
            let report = state.reconciler.sweep().await?;
            Ok(Json(ReconcileReportResponse::from(report)).into_response())
        }
    }
}
