use async_trait::async_trait;
use busconnect_core::payment::{
    ChargeRequest, ChargeSession, ChargeStatus, ChargeVerification, GatewayError, PaymentGateway,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Paystack REST client.
pub struct PaystackClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
    secret_key: String,
}

/// Every Paystack response shares this envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    status: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

impl PaystackClient {
    pub fn new(base_url: &str, secret_key: &str, request_timeout: Duration) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| GatewayError::Transport(format!("invalid gateway base url '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Transport(format!("gateway base url '{}' cannot carry a path", base_url)));
        }

        Ok(Self {
            http,
            base_url,
            secret_key: secret_key.to_string(),
        })
    }

    /// Appends path segments to the base url. Each segment is percent-encoded,
    /// so a reference can never climb out of its endpoint or add a query.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Transport(format!("gateway base url '{}' cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, GatewayError> {
        let response = request
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let http_status = response.status();
        let raw: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(format!("unreadable gateway response: {}", e)))?;

        let envelope: Envelope = serde_json::from_value(raw.clone()).map_err(|_| GatewayError::Rejected {
            http_status: Some(http_status.as_u16()),
            code: None,
            message: "unexpected gateway response".to_string(),
            raw: raw.clone(),
        })?;

        if !http_status.is_success() || !envelope.status {
            return Err(GatewayError::Rejected {
                http_status: Some(http_status.as_u16()),
                code: envelope.code,
                message: if envelope.message.is_empty() {
                    "gateway request failed".to_string()
                } else {
                    envelope.message
                },
                raw,
            });
        }

        Ok(raw)
    }
}

pub(crate) fn initialize_body(request: &ChargeRequest) -> Value {
    let mut metadata = request.metadata.clone();
    if let (Some(map), Some(momo)) = (metadata.as_object_mut(), &request.mobile_money) {
        map.insert("momo_phone".to_string(), json!(momo.phone));
        map.insert("momo_provider".to_string(), json!(momo.provider));
    }

    json!({
        "email": request.email,
        "amount": request.amount,
        "currency": request.currency,
        "reference": request.reference,
        "callback_url": request.callback_url,
        "channels": [request.channel.as_str()],
        "metadata": metadata,
    })
}

/// Reads the `data` object of a verify or submit_otp answer.
pub(crate) fn parse_verification(reference: &str, raw: Value) -> ChargeVerification {
    let data = &raw["data"];
    let gateway_status = data["status"].as_str().unwrap_or("unknown").to_string();
    let booking_id = data["metadata"]["booking_id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok());

    ChargeVerification {
        reference: data["reference"].as_str().unwrap_or(reference).to_string(),
        status: ChargeStatus::from_gateway(&gateway_status),
        gateway_status,
        amount_paid: data["amount"].as_i64(),
        booking_id,
        display_text: data["display_text"].as_str().map(str::to_string),
        raw,
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(&self, request: &ChargeRequest) -> Result<ChargeSession, GatewayError> {
        let url = self.endpoint(&["transaction", "initialize"])?;
        debug!("Initializing {} charge {}", request.channel.as_str(), request.reference);

        let raw = self.send(self.http.post(url).json(&initialize_body(request))).await?;
        let data = &raw["data"];

        let checkout_url = data["authorization_url"].as_str().ok_or_else(|| GatewayError::Rejected {
            http_status: None,
            code: None,
            message: "gateway response missing authorization_url".to_string(),
            raw: raw.clone(),
        })?;

        Ok(ChargeSession {
            checkout_url: checkout_url.to_string(),
            reference: data["reference"].as_str().unwrap_or(&request.reference).to_string(),
            access_code: data["access_code"].as_str().map(str::to_string),
        })
    }

    async fn verify(&self, reference: &str) -> Result<ChargeVerification, GatewayError> {
        let url = self.endpoint(&["transaction", "verify", reference])?;
        let raw = self.send(self.http.get(url)).await?;
        let verification = parse_verification(reference, raw);
        if verification.status == ChargeStatus::Pending {
            debug!("Reference {} still {}", reference, verification.gateway_status);
        }
        Ok(verification)
    }

    async fn submit_otp(&self, reference: &str, otp: &str) -> Result<ChargeVerification, GatewayError> {
        let url = self.endpoint(&["charge", "submit_otp"])?;
        let raw = self
            .send(self.http.post(url).json(&json!({ "reference": reference, "otp": otp })))
            .await?;
        let verification = parse_verification(reference, raw);
        if verification.status == ChargeStatus::Failed {
            warn!("OTP submission for {} ended as {}", reference, verification.gateway_status);
        }
        Ok(verification)
    }
}

impl std::fmt::Debug for PaystackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaystackClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busconnect_core::payment::{MobileMoneyDetails, PaymentChannel};

    #[test]
    fn test_initialize_body_carries_booking_metadata() {
        let request = ChargeRequest {
            reference: "BUS-12345678-1700000000000".to_string(),
            email: "ama@st.ug.edu.gh".to_string(),
            amount: 15500,
            currency: "GHS".to_string(),
            callback_url: "http://localhost:5173/payment/abc".to_string(),
            channel: PaymentChannel::MobileMoney,
            mobile_money: Some(MobileMoneyDetails {
                phone: "233241234567".to_string(),
                provider: "mtn".to_string(),
            }),
            metadata: json!({ "booking_id": "abc" }),
        };

        let body = initialize_body(&request);
        assert_eq!(body["amount"], 15500);
        assert_eq!(body["channels"][0], "mobile_money");
        assert_eq!(body["metadata"]["booking_id"], "abc");
        assert_eq!(body["metadata"]["momo_provider"], "mtn");
    }

    #[test]
    fn test_reference_stays_inside_verify_endpoint() {
        let client = PaystackClient::new("https://api.paystack.co", "sk_test_x", Duration::from_secs(5)).unwrap();

        let url = client.endpoint(&["transaction", "verify", "BUS-1b4e28ba-1700000000123"]).unwrap();
        assert_eq!(url.as_str(), "https://api.paystack.co/transaction/verify/BUS-1b4e28ba-1700000000123");

        let url = client.endpoint(&["transaction", "verify", "../../customer?perPage=100"]).unwrap();
        assert!(url.path().starts_with("/transaction/verify/"));
        assert_eq!(url.path_segments().map(|s| s.count()), Some(3));
        assert!(url.query().is_none());
    }

    #[test]
    fn test_base_url_with_prefix_and_trailing_slash() {
        let client = PaystackClient::new("http://localhost:9000/paystack/", "sk_test_x", Duration::from_secs(5)).unwrap();
        let url = client.endpoint(&["charge", "submit_otp"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/paystack/charge/submit_otp");

        assert!(PaystackClient::new("not a url", "sk_test_x", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_parse_verification() {
        let booking_id = Uuid::new_v4();
        let raw = json!({
            "status": true,
            "message": "Verification successful",
            "data": {
                "status": "ongoing",
                "reference": "BUS-1",
                "amount": 15500,
                "metadata": { "booking_id": booking_id.to_string() }
            }
        });

        let v = parse_verification("BUS-1", raw);
        assert_eq!(v.status, ChargeStatus::Pending);
        assert_eq!(v.gateway_status, "ongoing");
        assert_eq!(v.amount_paid, Some(15500));
        assert_eq!(v.booking_id, Some(booking_id));
    }

    #[test]
    fn test_parse_verification_tolerates_string_metadata() {
        let raw = json!({ "status": true, "data": { "status": "success", "amount": 100, "metadata": "" } });
        let v = parse_verification("BUS-2", raw);
        assert_eq!(v.status, ChargeStatus::Success);
        assert_eq!(v.reference, "BUS-2");
        assert!(v.booking_id.is_none());
    }
}
