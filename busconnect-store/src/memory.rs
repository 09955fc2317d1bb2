use async_trait::async_trait;
use busconnect_core::booking::{Booking, BookingStatus, NewBooking};
use busconnect_core::payment::{PaymentChannel, PaymentRecord, PaymentRecordStatus};
use busconnect_core::repository::{
    BookingRepository, ConfirmPayment, ConfirmationWrite, OutboxEntry, OutboxRepository, PaymentRepository,
    SeatDecrement, SeatLedgerStore, StoreError, StoreResult, TripRepository,
};
use busconnect_core::trip::Trip;
use busconnect_shared::models::events::{BookingConfirmedEvent, OutboundEvent};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    trips: HashMap<Uuid, Trip>,
    bookings: HashMap<Uuid, Booking>,
    payments: Vec<PaymentRecord>,
    outbox: Vec<(OutboxEntry, bool)>,
}

impl MemoryState {
    fn decrement(&mut self, trip_id: Uuid) -> StoreResult<SeatDecrement> {
        let trip = self
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| StoreError::NotFound(format!("trip {}", trip_id)))?;
        if trip.available_seats > 0 {
            trip.available_seats -= 1;
            Ok(SeatDecrement::Applied { remaining: trip.available_seats })
        } else {
            Ok(SeatDecrement::Refused)
        }
    }

    fn push_outbox(&mut self, event: OutboundEvent) {
        let entry = OutboxEntry {
            id: Uuid::new_v4(),
            event,
            created_at: Utc::now(),
        };
        self.outbox.push((entry, false));
    }
}

/// Store backed by a single mutex. Every method runs entirely under the lock,
/// which gives the same guarantees the Postgres store gets from its partial
/// unique index, conditional updates and transaction.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_trip(&self, trip: Trip) {
        self.state.lock().await.trips.insert(trip.id, trip);
    }

    pub async fn trip(&self, trip_id: Uuid) -> Option<Trip> {
        self.state.lock().await.trips.get(&trip_id).cloned()
    }

    pub async fn set_trip_price(&self, trip_id: Uuid, price: i64) {
        if let Some(trip) = self.state.lock().await.trips.get_mut(&trip_id) {
            trip.price = price;
        }
    }

    pub async fn bookings_for_trip(&self, trip_id: Uuid) -> Vec<Booking> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.trip_id == trip_id)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.seat_number);
        bookings
    }

    pub async fn payments_for_booking(&self, booking_id: Uuid) -> Vec<PaymentRecord> {
        let state = self.state.lock().await;
        state
            .payments
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect()
    }

    pub async fn outbox_events(&self) -> Vec<OutboundEvent> {
        let state = self.state.lock().await;
        state.outbox.iter().map(|(entry, _)| entry.event.clone()).collect()
    }

    /// Backdates a booking, for expiry scenarios.
    pub async fn set_booking_created_at(&self, booking_id: Uuid, created_at: DateTime<Utc>) {
        if let Some(booking) = self.state.lock().await.bookings.get_mut(&booking_id) {
            booking.created_at = created_at;
        }
    }
}

#[async_trait]
impl TripRepository for InMemoryStore {
    async fn get_trip(&self, id: Uuid) -> StoreResult<Option<Trip>> {
        Ok(self.state.lock().await.trips.get(&id).cloned())
    }
}

#[async_trait]
impl SeatLedgerStore for InMemoryStore {
    async fn list_occupied_seats(&self, trip_id: Uuid) -> StoreResult<Vec<i32>> {
        let state = self.state.lock().await;
        let mut seats: Vec<i32> = state
            .bookings
            .values()
            .filter(|b| b.trip_id == trip_id && b.status.holds_seat())
            .map(|b| b.seat_number)
            .collect();
        seats.sort_unstable();
        Ok(seats)
    }

    async fn decrement_available_seats(&self, trip_id: Uuid) -> StoreResult<SeatDecrement> {
        self.state.lock().await.decrement(trip_id)
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn insert_provisional(&self, booking: NewBooking) -> StoreResult<Booking> {
        let mut state = self.state.lock().await;

        if !state.trips.contains_key(&booking.trip_id) {
            return Err(StoreError::NotFound(format!("trip {}", booking.trip_id)));
        }

        let taken = state.bookings.values().any(|b| {
            b.trip_id == booking.trip_id && b.seat_number == booking.seat_number && b.status.holds_seat()
        });
        if taken {
            return Err(StoreError::UniqueViolation("bookings_active_seat_uidx".to_string()));
        }

        let booking = booking.into_booking(Uuid::new_v4(), Utc::now());
        state.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn confirm_paid_booking(&self, confirm: &ConfirmPayment) -> StoreResult<ConfirmationWrite> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let current = state
            .bookings
            .get(&confirm.booking_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("booking {}", confirm.booking_id)))?;

        match current.status {
            BookingStatus::Confirmed => return Ok(ConfirmationWrite::AlreadyConfirmed(current)),
            BookingStatus::Cancelled => return Ok(ConfirmationWrite::NotConfirmable(current)),
            BookingStatus::Provisional => {}
        }

        // Validate everything that can fail before mutating anything.
        if state
            .payments
            .iter()
            .any(|p| p.gateway_reference == confirm.reference && p.booking_id != current.id)
        {
            return Err(StoreError::UniqueViolation("payments_gateway_reference_key".to_string()));
        }
        if !state.trips.contains_key(&current.trip_id) {
            return Err(StoreError::NotFound(format!("trip {}", current.trip_id)));
        }

        let now = Utc::now();
        let mut booking = current;
        booking.status = BookingStatus::Confirmed;
        booking.payment_reference = Some(confirm.reference.clone());
        booking.updated_at = now;
        state.bookings.insert(booking.id, booking.clone());

        match state
            .payments
            .iter_mut()
            .find(|p| p.gateway_reference == confirm.reference)
        {
            Some(record) => {
                record.status = PaymentRecordStatus::Success;
                record.gateway_response = confirm.gateway_response.clone();
                record.error_code = None;
                record.error_message = None;
                record.updated_at = now;
            }
            None => {
                let mut record =
                    PaymentRecord::pending(booking.id, &confirm.reference, confirm.amount_paid, PaymentChannel::Card);
                record.status = PaymentRecordStatus::Success;
                record.gateway_response = confirm.gateway_response.clone();
                state.payments.push(record);
            }
        }

        let seats = state.decrement(booking.trip_id)?;

        state.push_outbox(OutboundEvent::BookingConfirmed(BookingConfirmedEvent {
            booking_id: booking.id,
            trip_id: booking.trip_id,
            user_id: booking.user_id.clone(),
            seat_number: booking.seat_number,
            passenger_name: booking.passenger.full_name.clone(),
            total_amount: booking.total_amount,
            payment_reference: confirm.reference.clone(),
            timestamp: now.timestamp(),
        }));

        Ok(ConfirmationWrite::Performed { booking, seats })
    }

    async fn cancel_stale_provisional(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let mut state = self.state.lock().await;
        let MemoryState { bookings, payments, .. } = &mut *state;

        let mut cancelled = Vec::new();
        for booking in bookings.values_mut() {
            if booking.status != BookingStatus::Provisional || booking.created_at >= cutoff {
                continue;
            }
            let protected = payments.iter().any(|p| {
                p.booking_id == booking.id
                    && (p.status == PaymentRecordStatus::Success || p.created_at >= cutoff)
            });
            if protected {
                continue;
            }
            booking.status = BookingStatus::Cancelled;
            booking.updated_at = Utc::now();
            cancelled.push(booking.clone());
        }
        Ok(cancelled)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn insert_payment(&self, record: &PaymentRecord) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state
            .payments
            .iter()
            .any(|p| p.gateway_reference == record.gateway_reference)
        {
            return Err(StoreError::UniqueViolation("payments_gateway_reference_key".to_string()));
        }
        state.payments.push(record.clone());
        Ok(())
    }

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<PaymentRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .find(|p| p.gateway_reference == reference)
            .cloned())
    }

    async fn mark_failed(
        &self,
        reference: &str,
        error_code: &str,
        gateway_response: &serde_json::Value,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state
            .payments
            .iter_mut()
            .find(|p| p.gateway_reference == reference && p.status == PaymentRecordStatus::Pending)
        {
            Some(record) => {
                record.status = PaymentRecordStatus::Failed;
                record.error_code = Some(error_code.to_string());
                record.gateway_response = gateway_response.clone();
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl OutboxRepository for InMemoryStore {
    async fn enqueue(&self, event: &OutboundEvent) -> StoreResult<()> {
        self.state.lock().await.push_outbox(event.clone());
        Ok(())
    }

    async fn fetch_undispatched(&self, limit: i64) -> StoreResult<Vec<OutboxEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .outbox
            .iter()
            .filter(|(_, dispatched)| !dispatched)
            .take(limit.max(0) as usize)
            .map(|(entry, _)| entry.clone())
            .collect())
    }

    async fn mark_dispatched(&self, id: Uuid) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let (_, dispatched) = state
            .outbox
            .iter_mut()
            .find(|(entry, _)| entry.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("outbox entry {}", id)))?;
        *dispatched = true;
        Ok(())
    }
}
