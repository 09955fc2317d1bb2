use uuid::Uuid;

pub const TOPIC_BOOKING_CONFIRMED: &str = "booking.confirmed";
pub const TOPIC_PAYMENT_FAILED: &str = "payment.failed";

/// Live seat map for one trip, pushed to subscribed browsers.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct SeatMapSnapshot {
    pub trip_id: Uuid,
    pub total_seats: i32,
    pub available_seats: i32,
    pub occupied_seats: Vec<i32>,
    pub generated_at: i64,
}

/// A row-level change on the bookings table, as emitted by the
/// `booking_changes` notification trigger or by in-process writers.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingChange {
    pub trip_id: Uuid,
    pub booking_id: Uuid,
    pub status: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub user_id: String,
    pub seat_number: i32,
    pub passenger_name: String,
    pub total_amount: i64,
    pub payment_reference: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentFailedEvent {
    pub booking_id: Uuid,
    pub user_id: String,
    pub payment_reference: String,
    pub gateway_status: String,
    pub timestamp: i64,
}

/// Everything the core hands to notification and reporting collaborators.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    BookingConfirmed(BookingConfirmedEvent),
    PaymentFailed(PaymentFailedEvent),
}

impl OutboundEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            OutboundEvent::BookingConfirmed(_) => TOPIC_BOOKING_CONFIRMED,
            OutboundEvent::PaymentFailed(_) => TOPIC_PAYMENT_FAILED,
        }
    }

    /// Partition key. Events for one booking stay ordered.
    pub fn key(&self) -> String {
        match self {
            OutboundEvent::BookingConfirmed(e) => e.booking_id.to_string(),
            OutboundEvent::PaymentFailed(e) => e.booking_id.to_string(),
        }
    }
}
