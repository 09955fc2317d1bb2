use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRecordStatus::Pending => "pending",
            PaymentRecordStatus::Success => "success",
            PaymentRecordStatus::Failed => "failed",
        }
    }
}

impl FromStr for PaymentRecordStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentRecordStatus::Pending),
            "success" => Ok(PaymentRecordStatus::Success),
            "failed" => Ok(PaymentRecordStatus::Failed),
            other => Err(CoreError::InternalError(format!("unknown payment status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentChannel {
    #[default]
    Card,
    MobileMoney,
}

impl PaymentChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentChannel::Card => "card",
            PaymentChannel::MobileMoney => "mobile_money",
        }
    }
}

/// One charge attempt against a booking. A booking may collect several.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub gateway_reference: String,
    pub amount: i64,
    pub channel: PaymentChannel,
    pub status: PaymentRecordStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub gateway_response: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn pending(booking_id: Uuid, reference: &str, amount: i64, channel: PaymentChannel) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_id,
            gateway_reference: reference.to_string(),
            amount,
            channel,
            status: PaymentRecordStatus::Pending,
            error_code: None,
            error_message: None,
            gateway_response: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobileMoneyDetails {
    pub phone: String,
    pub provider: String,
}

/// What the adapter sends to the provider. `amount` always comes from the
/// stored booking.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub reference: String,
    pub email: String,
    pub amount: i64,
    pub currency: String,
    pub callback_url: String,
    pub channel: PaymentChannel,
    pub mobile_money: Option<MobileMoneyDetails>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ChargeSession {
    pub checkout_url: String,
    pub reference: String,
    pub access_code: Option<String>,
}

/// Normalised provider status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Success,
    Failed,
    Pending,
}

impl ChargeStatus {
    /// Maps a provider status string. Unknown values stay pending so a
    /// charge is never reported failed on a guess. `abandoned` is what the
    /// provider reports for a checkout the payer has not finished yet.
    pub fn from_gateway(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "success" => ChargeStatus::Success,
            "failed" | "reversed" => ChargeStatus::Failed,
            _ => ChargeStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChargeVerification {
    pub reference: String,
    pub status: ChargeStatus,
    pub gateway_status: String,
    pub amount_paid: Option<i64>,
    pub booking_id: Option<Uuid>,
    pub display_text: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway rejected request: {message}")]
    Rejected {
        http_status: Option<u16>,
        code: Option<String>,
        message: String,
        raw: serde_json::Value,
    },
    #[error("gateway did not answer in time")]
    Timeout,
    #[error("gateway transport failure: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Operator-facing hint when the failure points at our own credentials.
    pub fn remediation_hint(&self) -> Option<String> {
        match self {
            GatewayError::Rejected { http_status, message, .. } => {
                let lowered = message.to_ascii_lowercase();
                if *http_status == Some(401) || lowered.contains("invalid key") {
                    Some("Update the payment gateway secret key in the service configuration".to_string())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn raw(&self) -> serde_json::Value {
        match self {
            GatewayError::Rejected { raw, .. } => raw.clone(),
            GatewayError::Timeout => serde_json::json!({"error": "timeout"}),
            GatewayError::Transport(msg) => serde_json::json!({"error": msg}),
        }
    }

    pub fn code(&self) -> String {
        match self {
            GatewayError::Rejected { code, http_status, .. } => code
                .clone()
                .or_else(|| http_status.map(|s| s.to_string()))
                .unwrap_or_else(|| "rejected".to_string()),
            GatewayError::Timeout => "timeout".to_string(),
            GatewayError::Transport(_) => "transport".to_string(),
        }
    }
}

/// Thin client over the external payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted checkout session
    async fn initialize(&self, request: &ChargeRequest) -> Result<ChargeSession, GatewayError>;

    /// Ask the provider whether a reference actually succeeded
    async fn verify(&self, reference: &str) -> Result<ChargeVerification, GatewayError>;

    /// Forward a mobile money OTP for a pending charge
    async fn submit_otp(&self, reference: &str, otp: &str) -> Result<ChargeVerification, GatewayError>;
}
