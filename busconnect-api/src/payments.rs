use axum::{extract::State, Extension, Json};
use busconnect_booking::{ConfirmationOutcome, InitializeChargeRequest, InitializeOutcome, OtpOutcome};
use busconnect_core::identity::Caller;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub reference: String,
    /// Only consulted when the reference was never recorded locally.
    #[serde(default)]
    pub booking_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub status: String,
    pub booking_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitOtpRequest {
    pub reference: String,
    pub otp: String,
}

/// POST /v1/payments/initialize
pub async fn initialize_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<InitializeChargeRequest>,
) -> Result<Json<InitializeOutcome>, AppError> {
    let outcome = state.engine.payments.initialize_charge(&caller, req).await?;
    Ok(Json(outcome))
}

/// POST /v1/payments/verify
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    let outcome = state
        .engine
        .confirmations
        .confirm_from_client(&caller, &req.reference, req.booking_id)
        .await?;
    record_outcome(&state, &outcome);

    let message = match &outcome {
        ConfirmationOutcome::ManualReview { .. } => {
            Some("Payment received but needs review. Our team will contact you.".to_string())
        }
        ConfirmationOutcome::Pending { .. } => Some("Payment is still processing. Check again shortly.".to_string()),
        _ => None,
    };

    Ok(Json(VerifyPaymentResponse {
        success: outcome.is_success(),
        status: outcome.status_label().to_string(),
        booking_id: outcome.booking_id(),
        message,
    }))
}

/// POST /v1/payments/otp
pub async fn submit_otp(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<SubmitOtpRequest>,
) -> Result<Json<OtpOutcome>, AppError> {
    let outcome = state.engine.payments.submit_otp(&caller, &req.reference, &req.otp).await?;
    Ok(Json(outcome))
}

/// Bumps the confirmation counters for whichever trigger produced `outcome`.
pub(crate) fn record_outcome(state: &AppState, outcome: &ConfirmationOutcome) {
    if let ConfirmationOutcome::Confirmed {
        newly_confirmed: true,
        integrity_alarm,
        ..
    } = outcome
    {
        state.metrics.confirmations.inc();
        if *integrity_alarm {
            state.metrics.integrity_alarms.inc();
        }
    }
}
