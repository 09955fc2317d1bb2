use async_trait::async_trait;
use busconnect_core::payment::{
    ChargeRequest, ChargeSession, ChargeStatus, ChargeVerification, GatewayError, PaymentGateway,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct MockCharge {
    amount: i64,
    amount_paid: Option<i64>,
    booking_id: Option<Uuid>,
    status: String,
}

#[derive(Default)]
struct MockState {
    charges: HashMap<String, MockCharge>,
    requests: Vec<ChargeRequest>,
    reject_initialize: Option<(u16, String)>,
    verify_delay: Option<Duration>,
}

/// Scriptable stand-in for the payment provider. Charges start `ongoing`
/// until a test (or the local dev flow) completes or fails them.
#[derive(Default)]
pub struct MockPaymentGateway {
    state: Mutex<MockState>,
    verify_calls: AtomicUsize,
    auto_complete: bool,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every initialized charge verifies as paid in full. For local runs
    /// without a provider account.
    pub fn auto_completing() -> Self {
        Self {
            auto_complete: true,
            ..Self::default()
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn reject_initialize(&self, http_status: u16, message: &str) {
        self.with_state(|s| s.reject_initialize = Some((http_status, message.to_string())));
    }

    pub fn delay_verify(&self, delay: Duration) {
        self.with_state(|s| s.verify_delay = Some(delay));
    }

    /// Registers a charge that was opened outside this process.
    pub fn register_charge(&self, reference: &str, booking_id: Uuid, amount: i64) {
        self.with_state(|s| {
            s.charges.insert(
                reference.to_string(),
                MockCharge {
                    amount,
                    amount_paid: None,
                    booking_id: Some(booking_id),
                    status: "ongoing".to_string(),
                },
            );
        });
    }

    /// Marks the charge paid in full.
    pub fn complete(&self, reference: &str) {
        self.with_state(|s| {
            if let Some(charge) = s.charges.get_mut(reference) {
                charge.status = "success".to_string();
                charge.amount_paid = Some(charge.amount);
            }
        });
    }

    pub fn complete_with_amount(&self, reference: &str, amount_paid: i64) {
        self.with_state(|s| {
            if let Some(charge) = s.charges.get_mut(reference) {
                charge.status = "success".to_string();
                charge.amount_paid = Some(amount_paid);
            }
        });
    }

    pub fn set_status(&self, reference: &str, status: &str) {
        self.with_state(|s| {
            if let Some(charge) = s.charges.get_mut(reference) {
                charge.status = status.to_string();
            }
        });
    }

    pub fn requests(&self) -> Vec<ChargeRequest> {
        self.with_state(|s| s.requests.clone())
    }

    pub fn last_reference(&self) -> Option<String> {
        self.with_state(|s| s.requests.last().map(|r| r.reference.clone()))
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    fn verification(&self, reference: &str) -> Result<ChargeVerification, GatewayError> {
        self.with_state(|s| {
            let charge = s.charges.get(reference).cloned().ok_or_else(|| GatewayError::Rejected {
                http_status: Some(400),
                code: Some("transaction_not_found".to_string()),
                message: "Transaction reference not found".to_string(),
                raw: json!({ "status": false, "message": "Transaction reference not found" }),
            })?;

            let raw = json!({
                "status": true,
                "message": "Verification successful",
                "data": {
                    "status": charge.status,
                    "reference": reference,
                    "amount": charge.amount_paid.unwrap_or(charge.amount),
                    "metadata": { "booking_id": charge.booking_id.map(|id| id.to_string()) }
                }
            });

            Ok(ChargeVerification {
                reference: reference.to_string(),
                status: ChargeStatus::from_gateway(&charge.status),
                gateway_status: charge.status.clone(),
                amount_paid: charge.amount_paid,
                booking_id: charge.booking_id,
                display_text: None,
                raw,
            })
        })
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn initialize(&self, request: &ChargeRequest) -> Result<ChargeSession, GatewayError> {
        let auto_complete = self.auto_complete;
        self.with_state(|s| {
            s.requests.push(request.clone());

            if let Some((http_status, message)) = &s.reject_initialize {
                return Err(GatewayError::Rejected {
                    http_status: Some(*http_status),
                    code: None,
                    message: message.clone(),
                    raw: json!({ "status": false, "message": message }),
                });
            }

            let booking_id = request.metadata["booking_id"]
                .as_str()
                .and_then(|id| Uuid::parse_str(id).ok());
            let (status, amount_paid) = if auto_complete {
                ("success", Some(request.amount))
            } else {
                ("ongoing", None)
            };
            s.charges.insert(
                request.reference.clone(),
                MockCharge {
                    amount: request.amount,
                    amount_paid,
                    booking_id,
                    status: status.to_string(),
                },
            );

            Ok(ChargeSession {
                checkout_url: format!("https://checkout.mock.local/{}", request.reference),
                reference: request.reference.clone(),
                access_code: Some(format!("mock_{}", request.reference)),
            })
        })
    }

    async fn verify(&self, reference: &str) -> Result<ChargeVerification, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.with_state(|s| s.verify_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.verification(reference)
    }

    async fn submit_otp(&self, reference: &str, otp: &str) -> Result<ChargeVerification, GatewayError> {
        self.with_state(|s| {
            if let Some(charge) = s.charges.get_mut(reference) {
                // Any six digit code is accepted; the charge then waits on the provider.
                charge.status = if otp.len() == 6 && otp.chars().all(|c| c.is_ascii_digit()) {
                    "pending".to_string()
                } else {
                    "failed".to_string()
                };
            }
        });
        let mut verification = self.verification(reference)?;
        verification.display_text = Some("Please approve the prompt on your phone".to_string());
        Ok(verification)
    }
}
