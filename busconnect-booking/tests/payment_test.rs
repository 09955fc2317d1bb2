mod common;

use async_trait::async_trait;
use busconnect_booking::{BookingEngine, ConfirmationOutcome, InitializeChargeRequest, InitializeOutcome};
use busconnect_core::booking::Booking;
use busconnect_core::payment::{ChargeStatus, MobileMoneyDetails, PaymentChannel, PaymentRecord, PaymentRecordStatus};
use busconnect_core::repository::{PaymentRepository, StoreError, StoreResult};
use busconnect_core::CoreError;
use busconnect_store::InMemoryStore;
use common::*;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Payment table that refuses every insert.
struct ReadOnlyPayments(Arc<InMemoryStore>);

#[async_trait]
impl PaymentRepository for ReadOnlyPayments {
    async fn insert_payment(&self, _record: &PaymentRecord) -> StoreResult<()> {
        Err(StoreError::Backend("connection reset".to_string()))
    }

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<PaymentRecord>> {
        self.0.find_by_reference(reference).await
    }

    async fn mark_failed(
        &self,
        reference: &str,
        error_code: &str,
        gateway_response: &serde_json::Value,
    ) -> StoreResult<bool> {
        self.0.mark_failed(reference, error_code, gateway_response).await
    }
}

fn card(booking_id: Uuid) -> InitializeChargeRequest {
    InitializeChargeRequest {
        booking_id,
        email: None,
        amount: None,
        channel: PaymentChannel::Card,
        mobile_money: None,
    }
}

async fn reserve(h: &Harness, user: &str, seat_number: i32) -> Booking {
    let trip_id = seed_trip(h, 40, 12000).await;
    h.engine
        .reservations
        .reserve_seat(&student(user), trip_id, seat(seat_number, "Adjoa Quaye"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_charge_amount_comes_from_booking() {
    let h = harness();
    let booking = reserve(&h, "adjoa", 11).await;

    let mut request = card(booking.id);
    request.amount = Some(1);
    let outcome = h.engine.payments.initialize_charge(&student("adjoa"), request).await.unwrap();

    let InitializeOutcome::Checkout { reference, amount, checkout_url, .. } = outcome else {
        panic!("expected checkout");
    };
    assert_eq!(amount, booking.total_amount);
    assert!(checkout_url.ends_with(&reference));
    assert!(reference.starts_with(&format!("BUS-{}", &booking.id.simple().to_string()[..8])));

    let sent = h.gateway.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].amount, 15000);
    assert_eq!(sent[0].email, "adjoa@st.knust.edu.gh");
    assert_eq!(sent[0].currency, "GHS");
    assert_eq!(sent[0].callback_url, format!("https://busconnect.test/payment/{}", booking.id));
    assert_eq!(sent[0].metadata["seat_number"], 11);

    let payments = h.store.payments_for_booking(booking.id).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentRecordStatus::Pending);
    assert_eq!(payments[0].amount, 15000);
}

#[tokio::test]
async fn test_non_owner_is_refused_before_gateway() {
    let h = harness();
    let booking = reserve(&h, "owner", 1).await;

    let err = h
        .engine
        .payments
        .initialize_charge(&student("intruder"), card(booking.id))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Forbidden));
    assert!(h.gateway.requests().is_empty());
    assert!(h.store.payments_for_booking(booking.id).await.is_empty());

    // Administrators may act for anyone, but still need an email.
    let err = h.engine.payments.initialize_charge(&admin(), card(booking.id)).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));
}

#[tokio::test]
async fn test_gateway_rejection_is_recorded_with_hint() {
    let h = harness();
    let booking = reserve(&h, "abla", 2).await;
    h.gateway.reject_initialize(401, "Invalid key");

    let err = h
        .engine
        .payments
        .initialize_charge(&student("abla"), card(booking.id))
        .await
        .unwrap_err();

    let CoreError::GatewayError { message, hint, reference } = err else {
        panic!("expected gateway error");
    };
    assert_eq!(message, "Invalid key");
    assert_eq!(
        hint.as_deref(),
        Some("Update the payment gateway secret key in the service configuration")
    );

    let payments = h.store.payments_for_booking(booking.id).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentRecordStatus::Failed);
    assert_eq!(Some(payments[0].gateway_reference.clone()), reference);
    assert_eq!(payments[0].error_message.as_deref(), Some("gateway rejected request: Invalid key"));
    assert_eq!(payments[0].gateway_response["message"], "Invalid key");
}

#[tokio::test]
async fn test_other_rejections_get_a_generic_message() {
    let h = harness();
    let booking = reserve(&h, "akua", 3).await;
    h.gateway.reject_initialize(400, "Merchant risk flag ID 99812: fraud_rule_momo_7 triggered");

    let err = h
        .engine
        .payments
        .initialize_charge(&student("akua"), card(booking.id))
        .await
        .unwrap_err();

    let CoreError::GatewayError { message, hint, reference } = err else {
        panic!("expected gateway error");
    };
    assert_eq!(message, "Could not start payment, please try again");
    assert!(hint.is_none());

    // The provider's wording is kept for operators on the failed record.
    let payments = h.store.payments_for_booking(booking.id).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(Some(payments[0].gateway_reference.clone()), reference);
    assert!(payments[0].error_message.as_deref().unwrap().contains("fraud_rule_momo_7"));
}

#[tokio::test]
async fn test_checkout_survives_lost_payment_record() {
    let h = harness();
    let mut repos = repositories(&h.store);
    repos.payments = Arc::new(ReadOnlyPayments(h.store.clone()));
    let engine = BookingEngine::new(repos, h.gateway.clone(), options());

    let booking = reserve(&h, "yaw", 6).await;
    let outcome = engine.payments.initialize_charge(&student("yaw"), card(booking.id)).await.unwrap();
    let InitializeOutcome::Checkout { reference, .. } = outcome else {
        panic!("expected checkout");
    };
    assert!(h.store.payments_for_booking(booking.id).await.is_empty());

    // Without a local row the booking id from the caller and the charge
    // metadata still tie the payment to the booking.
    h.gateway.complete(&reference);
    let confirmed = engine
        .confirmations
        .confirm_from_client(&student("yaw"), &reference, Some(booking.id))
        .await
        .unwrap();
    assert!(matches!(confirmed, ConfirmationOutcome::Confirmed { newly_confirmed: true, .. }));
    assert_eq!(h.store.trip(booking.trip_id).await.unwrap().available_seats, 39);
}

#[tokio::test]
async fn test_confirmed_booking_is_not_charged_again() {
    let h = harness();
    let booking = reserve(&h, "kafui", 5).await;
    let InitializeOutcome::Checkout { reference, .. } =
        h.engine.payments.initialize_charge(&student("kafui"), card(booking.id)).await.unwrap()
    else {
        panic!("expected checkout");
    };
    h.gateway.complete(&reference);
    let outcome = h
        .engine
        .confirmations
        .confirm_from_client(&student("kafui"), &reference, None)
        .await
        .unwrap();
    assert!(matches!(outcome, ConfirmationOutcome::Confirmed { newly_confirmed: true, .. }));

    let again = h
        .engine
        .payments
        .initialize_charge(&student("kafui"), card(booking.id))
        .await
        .unwrap();
    assert!(matches!(again, InitializeOutcome::AlreadyConfirmed { booking_id } if booking_id == booking.id));
    assert_eq!(h.gateway.requests().len(), 1);
}

#[tokio::test]
async fn test_cancelled_booking_is_not_payable() {
    let mut opts = options();
    opts.provisional_ttl = Some(Duration::from_secs(60));
    let h = harness_with(opts);
    let booking = reserve(&h, "senyo", 7).await;

    let expiry = h.engine.expiry.clone().unwrap();
    expiry.sweep(chrono::Utc::now() + chrono::Duration::minutes(5)).await.unwrap();

    let err = h
        .engine
        .payments
        .initialize_charge(&student("senyo"), card(booking.id))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::BookingNotPayable(_)));
}

#[tokio::test]
async fn test_mobile_money_charge_and_otp() {
    let h = harness();
    let booking = reserve(&h, "delali", 9).await;

    let request = InitializeChargeRequest {
        booking_id: booking.id,
        email: Some("delali@example.com".to_string()),
        amount: None,
        channel: PaymentChannel::MobileMoney,
        mobile_money: Some(MobileMoneyDetails {
            phone: "0551234567".to_string(),
            provider: "MTN".to_string(),
        }),
    };
    let InitializeOutcome::Checkout { reference, .. } =
        h.engine.payments.initialize_charge(&student("delali"), request).await.unwrap()
    else {
        panic!("expected checkout");
    };

    let sent = &h.gateway.requests()[0];
    let momo = sent.mobile_money.as_ref().unwrap();
    assert_eq!(momo.phone, "233551234567");
    assert_eq!(momo.provider, "mtn");
    assert_eq!(sent.email, "delali@example.com");

    let err = h
        .engine
        .payments
        .submit_otp(&student("someone-else"), &reference, "123456")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden));

    let otp = h
        .engine
        .payments
        .submit_otp(&student("delali"), &reference, "123456")
        .await
        .unwrap();
    assert_eq!(otp.status, ChargeStatus::Pending);
    assert!(otp.display_text.is_some());

    // OTP submission alone never confirms.
    let stored = h.engine.reservations.get_booking(&student("delali"), booking.id).await.unwrap();
    assert_eq!(stored.status, busconnect_core::booking::BookingStatus::Provisional);
}

#[tokio::test]
async fn test_verify_unknown_reference_is_gateway_error() {
    let h = harness();
    let err = h.engine.payments.verify_charge("BUS-unknown").await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::GatewayError { ref message, hint: None, .. } if message == "Could not check this payment, please try again"
    ));
}
