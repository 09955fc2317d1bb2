use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use busconnect_booking::signature::SIGNATURE_HEADER;
use busconnect_booking::{ConfirmationOutcome, WebhookAck};
use busconnect_core::CoreError;
use serde_json::json;

use crate::error::AppError;
use crate::payments::record_outcome;
use crate::state::AppState;

/// POST /v1/webhooks/paystack
/// The body is taken raw: the signature covers the exact bytes sent.
pub async fn handle_paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let ack = match state.engine.confirmations.handle_webhook(&body, signature).await {
        Ok(ack) => ack,
        Err(CoreError::InvalidSignature) => {
            state.metrics.webhook_rejections.inc();
            return Err(CoreError::InvalidSignature.into());
        }
        Err(e) => return Err(e.into()),
    };

    match ack {
        WebhookAck::Ignored { event } => {
            tracing::debug!("Acknowledged webhook {} without action", event);
            Ok((StatusCode::OK, Json(json!({ "received": true }))).into_response())
        }
        WebhookAck::Processed(outcome) => {
            record_outcome(&state, &outcome);
            tracing::info!(
                "Webhook for booking {} processed: {}",
                outcome.booking_id(),
                outcome.status_label()
            );
            // Pending means we could not get ground truth yet; a 5xx makes
            // the provider redeliver later.
            if let ConfirmationOutcome::Pending { .. } = outcome {
                return Ok((
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "received": false, "status": outcome.status_label() })),
                )
                    .into_response());
            }
            Ok((StatusCode::OK, Json(json!({ "received": true }))).into_response())
        }
    }
}
