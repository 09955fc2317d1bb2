use busconnect_core::booking::{Booking, NewBooking, PassengerDetails};
use busconnect_core::identity::Caller;
use busconnect_core::repository::{BookingRepository, StoreError, TripRepository};
use busconnect_core::{CoreError, CoreResult};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::feed::ChangeFeed;
use crate::ledger::SeatLedger;
use crate::pricing::FareSchedule;

#[derive(Debug, Clone, Deserialize)]
pub struct ReserveSeatRequest {
    pub seat_number: i32,
    pub passenger: PassengerDetails,
}

/// Turns a (trip, seat, passenger) selection into a provisional booking.
pub struct ReservationService {
    trips: Arc<dyn TripRepository>,
    bookings: Arc<dyn BookingRepository>,
    ledger: Arc<SeatLedger>,
    fares: FareSchedule,
    feed: ChangeFeed,
}

impl ReservationService {
    pub fn new(
        trips: Arc<dyn TripRepository>,
        bookings: Arc<dyn BookingRepository>,
        ledger: Arc<SeatLedger>,
        fares: FareSchedule,
        feed: ChangeFeed,
    ) -> Self {
        Self {
            trips,
            bookings,
            ledger,
            fares,
            feed,
        }
    }

    pub async fn reserve_seat(&self, caller: &Caller, trip_id: Uuid, request: ReserveSeatRequest) -> CoreResult<Booking> {
        self.reserve_seat_on(caller, trip_id, request, Utc::now().date_naive()).await
    }

    /// Same as `reserve_seat` with an explicit "today" for the departure check.
    pub async fn reserve_seat_on(
        &self,
        caller: &Caller,
        trip_id: Uuid,
        request: ReserveSeatRequest,
        today: NaiveDate,
    ) -> CoreResult<Booking> {
        let passenger = request.passenger.normalized()?;
        let seat_number = request.seat_number;

        // 1. Trip must exist and be open for booking
        let trip = self
            .trips
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("trip {}", trip_id)))?;
        trip.ensure_bookable(today)?;

        if !trip.seat_in_range(seat_number) {
            return Err(CoreError::ValidationError(format!(
                "seat {} is outside 1..={}",
                seat_number, trip.total_seats
            )));
        }

        // 2. Cheap pre-check so most collisions fail before the insert. The
        // unique index below is what actually decides.
        let occupied = self.ledger.list_occupied_seats(trip_id).await?;
        if occupied.contains(&seat_number) {
            return Err(CoreError::SeatConflict { trip_id, seat_number });
        }

        // 3. Freeze the price
        let fare = self.fares.quote(&trip, &passenger);

        // 4. Insert; a concurrent booker may still win here
        let booking = self
            .bookings
            .insert_provisional(NewBooking {
                trip_id,
                user_id: caller.user_id.clone(),
                seat_number,
                passenger,
                fare,
            })
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => CoreError::SeatConflict { trip_id, seat_number },
                other => other.into(),
            })?;

        tracing::info!(
            "Provisional booking {} for seat {} on trip {} (total {}, contact {})",
            booking.id,
            seat_number,
            trip_id,
            booking.total_amount,
            booking.passenger.phone.hint()
        );

        self.feed.publish_trip(trip_id).await;

        Ok(booking)
    }

    /// Owner or admin only.
    pub async fn get_booking(&self, caller: &Caller, booking_id: Uuid) -> CoreResult<Booking> {
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking_id)))?;

        if !caller.may_act_for(&booking.user_id) {
            return Err(CoreError::Forbidden);
        }
        Ok(booking)
    }
}
