use busconnect_core::booking::{Booking, BookingStatus};
use busconnect_core::identity::Caller;
use busconnect_core::payment::{
    ChargeRequest, ChargeStatus, ChargeVerification, GatewayError, MobileMoneyDetails, PaymentChannel, PaymentGateway,
    PaymentRecord, PaymentRecordStatus,
};
use busconnect_core::repository::{BookingRepository, PaymentRepository};
use busconnect_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const MOBILE_MONEY_PROVIDERS: [&str; 3] = ["mtn", "vod", "tgo"];

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub currency: String,
    pub callback_base_url: String,
    pub verify_timeout: Duration,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            currency: "GHS".to_string(),
            callback_base_url: "http://localhost:5173".to_string(),
            verify_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeChargeRequest {
    pub booking_id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    /// Accepted for compatibility with older clients and ignored: the charge
    /// is always the stored booking total.
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub channel: PaymentChannel,
    #[serde(default)]
    pub mobile_money: Option<MobileMoneyDetails>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InitializeOutcome {
    Checkout {
        booking_id: Uuid,
        checkout_url: String,
        reference: String,
        amount: i64,
    },
    AlreadyConfirmed {
        booking_id: Uuid,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct OtpOutcome {
    pub reference: String,
    pub status: ChargeStatus,
    pub gateway_status: String,
    pub display_text: Option<String>,
}

/// Everything that talks to the payment provider goes through here. Callers
/// are authorised against the booking before any gateway call is made.
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    bookings: Arc<dyn BookingRepository>,
    payments: Arc<dyn PaymentRepository>,
    settings: PaymentSettings,
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        bookings: Arc<dyn BookingRepository>,
        payments: Arc<dyn PaymentRepository>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            gateway,
            bookings,
            payments,
            settings,
        }
    }

    /// Loads a booking and checks the caller may act on it.
    pub async fn authorize(&self, caller: &Caller, booking_id: Uuid) -> CoreResult<Booking> {
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking_id)))?;

        if !caller.may_act_for(&booking.user_id) {
            tracing::warn!(
                "User {} attempted to act on booking {} owned by someone else",
                caller.user_id,
                booking_id
            );
            return Err(CoreError::Forbidden);
        }
        Ok(booking)
    }

    pub async fn initialize_charge(&self, caller: &Caller, request: InitializeChargeRequest) -> CoreResult<InitializeOutcome> {
        let booking = self.authorize(caller, request.booking_id).await?;

        match booking.status {
            BookingStatus::Confirmed => {
                tracing::info!("Booking {} already confirmed, no new charge", booking.id);
                return Ok(InitializeOutcome::AlreadyConfirmed { booking_id: booking.id });
            }
            BookingStatus::Cancelled => {
                return Err(CoreError::BookingNotPayable(format!("booking {} is cancelled", booking.id)));
            }
            BookingStatus::Provisional => {}
        }

        if let Some(requested) = request.amount {
            if requested != booking.total_amount {
                tracing::warn!(
                    "Ignoring client amount {} for booking {} (stored total {})",
                    requested,
                    booking.id,
                    booking.total_amount
                );
            }
        }

        let email = request
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .or_else(|| caller.email.clone())
            .ok_or_else(|| CoreError::ValidationError("payer email is required".to_string()))?;

        let mobile_money = match request.channel {
            PaymentChannel::Card => None,
            PaymentChannel::MobileMoney => {
                let details = request
                    .mobile_money
                    .ok_or_else(|| CoreError::ValidationError("mobile money details are required".to_string()))?;
                Some(normalize_mobile_money(details)?)
            }
        };

        let reference = generate_reference(booking.id, chrono::Utc::now().timestamp_millis());
        let charge = ChargeRequest {
            reference: reference.clone(),
            email,
            amount: booking.total_amount,
            currency: self.settings.currency.clone(),
            callback_url: format!(
                "{}/payment/{}",
                self.settings.callback_base_url.trim_end_matches('/'),
                booking.id
            ),
            channel: request.channel,
            mobile_money,
            metadata: serde_json::json!({
                "booking_id": booking.id,
                "trip_id": booking.trip_id,
                "seat_number": booking.seat_number,
            }),
        };

        let mut record = PaymentRecord::pending(booking.id, &reference, booking.total_amount, request.channel);

        match self.gateway.initialize(&charge).await {
            Ok(session) => {
                // The checkout is already open on the provider side. Losing the
                // local row is recoverable: both confirmation paths fall back to
                // the booking id carried in the charge metadata.
                if let Err(store_err) = self.payments.insert_payment(&record).await {
                    tracing::error!(
                        "Charge {} opened for booking {} but the payment record was not stored: {}",
                        session.reference,
                        booking.id,
                        store_err
                    );
                }
                tracing::info!(
                    "Charge {} opened for booking {} ({} {})",
                    session.reference,
                    booking.id,
                    booking.total_amount,
                    self.settings.currency
                );
                Ok(InitializeOutcome::Checkout {
                    booking_id: booking.id,
                    checkout_url: session.checkout_url,
                    reference: session.reference,
                    amount: booking.total_amount,
                })
            }
            Err(err) => {
                tracing::error!("Gateway rejected charge {} for booking {}: {}", reference, booking.id, err);

                // Keep the attempt on file so "never tried" and "tried and
                // rejected" stay distinguishable.
                record.status = PaymentRecordStatus::Failed;
                record.error_code = Some(err.code());
                record.error_message = Some(err.to_string());
                record.gateway_response = err.raw();
                if let Err(store_err) = self.payments.insert_payment(&record).await {
                    tracing::error!("Failed to persist rejected charge {}: {}", reference, store_err);
                }

                Err(gateway_error(&err, INITIALIZE_FAILED, reference))
            }
        }
    }

    /// Read-only status query. Timeouts and transport failures come back as
    /// `Pending`; only a definite provider rejection is an error.
    pub async fn verify_charge(&self, reference: &str) -> CoreResult<ChargeVerification> {
        let pending = |gateway_status: &str| ChargeVerification {
            reference: reference.to_string(),
            status: ChargeStatus::Pending,
            gateway_status: gateway_status.to_string(),
            amount_paid: None,
            booking_id: None,
            display_text: None,
            raw: serde_json::Value::Null,
        };

        match tokio::time::timeout(self.settings.verify_timeout, self.gateway.verify(reference)).await {
            Ok(Ok(verification)) => Ok(verification),
            Ok(Err(GatewayError::Timeout)) | Err(_) => {
                tracing::warn!("Verification of {} timed out, treating as pending", reference);
                Ok(pending("timeout"))
            }
            Ok(Err(GatewayError::Transport(msg))) => {
                tracing::warn!("Gateway unreachable while verifying {}: {}", reference, msg);
                Ok(pending("unreachable"))
            }
            Ok(Err(err)) => {
                tracing::warn!("Gateway refused verification of {}: {}", reference, err);
                Err(gateway_error(&err, VERIFY_FAILED, reference.to_string()))
            }
        }
    }

    /// Forwards a mobile money OTP. Never confirms anything by itself.
    pub async fn submit_otp(&self, caller: &Caller, reference: &str, otp: &str) -> CoreResult<OtpOutcome> {
        let otp = otp.trim();
        if otp.is_empty() {
            return Err(CoreError::ValidationError("otp is required".to_string()));
        }

        let record = self
            .payments
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("payment {}", reference)))?;
        self.authorize(caller, record.booking_id).await?;

        let verification = self.gateway.submit_otp(reference, otp).await.map_err(|err| {
            tracing::warn!("Gateway refused OTP for {}: {}", reference, err);
            gateway_error(&err, OTP_FAILED, reference.to_string())
        })?;

        Ok(OtpOutcome {
            reference: verification.reference,
            status: verification.status,
            gateway_status: verification.gateway_status,
            display_text: verification.display_text,
        })
    }
}

const INITIALIZE_FAILED: &str = "Could not start payment, please try again";
const VERIFY_FAILED: &str = "Could not check this payment, please try again";
const OTP_FAILED: &str = "Could not submit the code, please try again";

/// Provider wording is only passed through when it points at our own
/// credentials. Anything else gets a generic retry message; the raw answer
/// stays in the log and on the payment record.
fn gateway_error(err: &GatewayError, fallback: &str, reference: String) -> CoreError {
    let hint = err.remediation_hint();
    let message = match (err, &hint) {
        (GatewayError::Rejected { message, .. }, Some(_)) => message.clone(),
        _ => fallback.to_string(),
    };
    CoreError::GatewayError {
        message,
        hint,
        reference: Some(reference),
    }
}

/// Gateway references are short tokens of letters, digits and `._=-`.
pub fn is_valid_reference(reference: &str) -> bool {
    !reference.is_empty()
        && reference.len() <= 100
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '=' | '-'))
}

/// `BUS-{first 8 chars of booking id}-{unix millis}`
pub fn generate_reference(booking_id: Uuid, unix_millis: i64) -> String {
    let simple = booking_id.simple().to_string();
    format!("BUS-{}-{}", &simple[..8], unix_millis)
}

/// Ghana numbers: `0XXXXXXXXX` becomes `233XXXXXXXXX`, a leading `+` is dropped.
pub fn normalize_msisdn(phone: &str) -> CoreResult<String> {
    let digits: String = phone.trim().trim_start_matches('+').chars().filter(|c| !c.is_whitespace()).collect();

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::ValidationError(format!("invalid phone number '{}'", phone)));
    }

    let normalized = match digits.strip_prefix('0') {
        Some(local) if local.len() == 9 => format!("233{}", local),
        _ => digits,
    };

    if !normalized.starts_with("233") || normalized.len() != 12 {
        return Err(CoreError::ValidationError(format!("invalid phone number '{}'", phone)));
    }
    Ok(normalized)
}

fn normalize_mobile_money(details: MobileMoneyDetails) -> CoreResult<MobileMoneyDetails> {
    let provider = details.provider.trim().to_ascii_lowercase();
    if !MOBILE_MONEY_PROVIDERS.contains(&provider.as_str()) {
        return Err(CoreError::ValidationError(format!(
            "unsupported mobile money provider '{}'",
            details.provider
        )));
    }
    Ok(MobileMoneyDetails {
        phone: normalize_msisdn(&details.phone)?,
        provider,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_format() {
        let id = Uuid::parse_str("1b4e28ba-2fa1-11d2-883f-0016d3cca427").unwrap();
        assert_eq!(generate_reference(id, 1700000000123), "BUS-1b4e28ba-1700000000123");
    }

    #[test]
    fn test_reference_charset() {
        assert!(is_valid_reference("BUS-1b4e28ba-1700000000123"));
        assert!(is_valid_reference("T123_abc.x=1"));
        assert!(!is_valid_reference(""));
        assert!(!is_valid_reference("../../customer?perPage=100"));
        assert!(!is_valid_reference("BUS-1/verify"));
        assert!(!is_valid_reference(&"A".repeat(101)));
    }

    #[test]
    fn test_msisdn_normalisation() {
        assert_eq!(normalize_msisdn("0244123456").unwrap(), "233244123456");
        assert_eq!(normalize_msisdn("+233244123456").unwrap(), "233244123456");
        assert_eq!(normalize_msisdn("233 24 412 3456").unwrap(), "233244123456");
        assert!(normalize_msisdn("12345").is_err());
        assert!(normalize_msisdn("02441234ab").is_err());
    }

    #[test]
    fn test_mobile_money_provider_required() {
        let bad = MobileMoneyDetails {
            phone: "0244123456".to_string(),
            provider: "paypal".to_string(),
        };
        assert!(matches!(normalize_mobile_money(bad), Err(CoreError::ValidationError(_))));

        let ok = normalize_mobile_money(MobileMoneyDetails {
            phone: "0244123456".to_string(),
            provider: "MTN".to_string(),
        })
        .unwrap();
        assert_eq!(ok.provider, "mtn");
        assert_eq!(ok.phone, "233244123456");
    }

    fn rejected(http_status: u16, message: &str) -> GatewayError {
        GatewayError::Rejected {
            http_status: Some(http_status),
            code: None,
            message: message.to_string(),
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_provider_wording_stays_internal() {
        let err = gateway_error(
            &rejected(400, "Merchant risk flag ID 99812 triggered"),
            INITIALIZE_FAILED,
            "BUS-1".to_string(),
        );
        let CoreError::GatewayError { message, hint, reference } = err else {
            panic!("expected gateway error");
        };
        assert_eq!(message, INITIALIZE_FAILED);
        assert!(hint.is_none());
        assert_eq!(reference.as_deref(), Some("BUS-1"));

        let err = gateway_error(&GatewayError::Transport("dns failure".to_string()), OTP_FAILED, "BUS-2".to_string());
        assert!(matches!(err, CoreError::GatewayError { message, .. } if message == OTP_FAILED));
    }

    #[test]
    fn test_credential_failure_keeps_message_and_hint() {
        let err = gateway_error(&rejected(401, "Invalid key"), INITIALIZE_FAILED, "BUS-3".to_string());
        let CoreError::GatewayError { message, hint, .. } = err else {
            panic!("expected gateway error");
        };
        assert_eq!(message, "Invalid key");
        assert!(hint.is_some());
    }
}
