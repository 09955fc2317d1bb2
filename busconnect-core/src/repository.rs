use async_trait::async_trait;
use busconnect_shared::models::events::OutboundEvent;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, NewBooking};
use crate::payment::PaymentRecord;
use crate::trip::Trip;
use crate::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => CoreError::NotFound(what),
            other => CoreError::StorageError(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of the conditional `available_seats` decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatDecrement {
    Applied { remaining: i32 },
    /// The counter was already zero. Nothing changed; this is an integrity alarm.
    Refused,
}

/// Inputs to the single confirmation unit of work.
#[derive(Debug, Clone)]
pub struct ConfirmPayment {
    pub booking_id: Uuid,
    pub reference: String,
    pub amount_paid: i64,
    pub gateway_response: serde_json::Value,
}

/// What the conditional `provisional -> confirmed` write observed.
#[derive(Debug, Clone)]
pub enum ConfirmationWrite {
    /// This call performed the transition and all of its side effects.
    Performed { booking: Booking, seats: SeatDecrement },
    AlreadyConfirmed(Booking),
    /// The booking was cancelled before the payment landed.
    NotConfirmable(Booking),
}

#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub event: OutboundEvent,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn get_trip(&self, id: Uuid) -> StoreResult<Option<Trip>>;
}

/// Storage primitives beneath the seat ledger.
#[async_trait]
pub trait SeatLedgerStore: Send + Sync {
    /// Seat numbers held by provisional or confirmed bookings, ascending.
    async fn list_occupied_seats(&self, trip_id: Uuid) -> StoreResult<Vec<i32>>;

    /// The only writer of `available_seats`. Must be a single conditional
    /// update at the storage layer.
    async fn decrement_available_seats(&self, trip_id: Uuid) -> StoreResult<SeatDecrement>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Fails with `UniqueViolation` when a non-cancelled booking already
    /// holds the seat.
    async fn insert_provisional(&self, booking: NewBooking) -> StoreResult<Booking>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    /// Conditional confirm, payment success, seat decrement and outbox insert
    /// as one unit. Either all of it happens or none of it does.
    async fn confirm_paid_booking(&self, confirm: &ConfirmPayment) -> StoreResult<ConfirmationWrite>;

    /// Cancel provisional bookings created before `cutoff`. Returns the
    /// bookings that were actually cancelled by this call.
    async fn cancel_stale_provisional(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Booking>>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert_payment(&self, record: &PaymentRecord) -> StoreResult<()>;

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<PaymentRecord>>;

    /// Moves a pending record to failed. Returns false if it was not pending.
    async fn mark_failed(
        &self,
        reference: &str,
        error_code: &str,
        gateway_response: &serde_json::Value,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn enqueue(&self, event: &OutboundEvent) -> StoreResult<()>;

    async fn fetch_undispatched(&self, limit: i64) -> StoreResult<Vec<OutboxEntry>>;

    async fn mark_dispatched(&self, id: Uuid) -> StoreResult<()>;
}
