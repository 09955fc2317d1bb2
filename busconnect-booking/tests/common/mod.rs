#![allow(dead_code)]

use busconnect_booking::{
    BookingEngine, EngineOptions, FareSchedule, PaymentSettings, Repositories, ReserveSeatRequest,
};
use busconnect_core::booking::PassengerDetails;
use busconnect_core::identity::{Caller, Role};
use busconnect_core::trip::{Trip, TripStatus};
use busconnect_shared::pii::Masked;
use busconnect_store::{InMemoryStore, MockPaymentGateway};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "sk_test_busconnect";

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<MockPaymentGateway>,
    pub engine: BookingEngine,
}

pub fn repositories(store: &Arc<InMemoryStore>) -> Repositories {
    Repositories {
        trips: store.clone(),
        seats: store.clone(),
        bookings: store.clone(),
        payments: store.clone(),
        outbox: store.clone(),
    }
}

pub fn options() -> EngineOptions {
    EngineOptions {
        fares: FareSchedule::default(),
        payments: PaymentSettings {
            currency: "GHS".to_string(),
            callback_base_url: "https://busconnect.test".to_string(),
            verify_timeout: Duration::from_secs(2),
        },
        webhook_secret: WEBHOOK_SECRET.to_string(),
        feed_capacity: 16,
        provisional_ttl: None,
    }
}

pub fn harness_with(options: EngineOptions) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(MockPaymentGateway::new());
    let engine = BookingEngine::new(repositories(&store), gateway.clone(), options);
    Harness { store, gateway, engine }
}

pub fn harness() -> Harness {
    harness_with(options())
}

pub fn trip(total_seats: i32, price: i64) -> Trip {
    Trip {
        id: Uuid::new_v4(),
        origin: "KNUST".to_string(),
        destination: "Accra Circle".to_string(),
        organizer_id: "organizer-1".to_string(),
        departure_date: NaiveDate::from_ymd_opt(2030, 12, 20).unwrap(),
        price,
        total_seats,
        available_seats: total_seats,
        status: TripStatus::Approved,
        created_at: chrono::Utc::now(),
    }
}

pub async fn seed_trip(h: &Harness, total_seats: i32, price: i64) -> Uuid {
    let trip = trip(total_seats, price);
    let id = trip.id;
    h.store.insert_trip(trip).await;
    id
}

pub fn passenger(name: &str) -> PassengerDetails {
    PassengerDetails {
        full_name: name.to_string(),
        student_id: "20459876".to_string(),
        student_class: "Level 200".to_string(),
        phone: Masked("0244556677".to_string()),
        emergency_contact: Masked("0207788990".to_string()),
        has_luggage: false,
        luggage_count: 0,
    }
}

pub fn seat(seat_number: i32, name: &str) -> ReserveSeatRequest {
    ReserveSeatRequest {
        seat_number,
        passenger: passenger(name),
    }
}

pub fn student(id: &str) -> Caller {
    Caller::new(id, Role::Student).with_email(format!("{}@st.knust.edu.gh", id))
}

pub fn admin() -> Caller {
    Caller::new("admin-1", Role::Admin)
}

/// charge.success webhook body plus a valid signature for it.
pub fn signed_charge_success(reference: &str, booking_id: Uuid) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(&serde_json::json!({
        "event": "charge.success",
        "data": {
            "reference": reference,
            "status": "success",
            "metadata": { "booking_id": booking_id.to_string() }
        }
    }))
    .unwrap();
    let signature = busconnect_booking::signature::sign(WEBHOOK_SECRET.as_bytes(), &body);
    (body, signature)
}
