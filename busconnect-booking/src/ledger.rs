use busconnect_core::repository::{SeatDecrement, SeatLedgerStore, TripRepository};
use busconnect_core::{CoreError, CoreResult};
use busconnect_shared::models::events::SeatMapSnapshot;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Source of truth for which seats on a trip are taken, and the only path
/// that moves `available_seats`.
pub struct SeatLedger {
    trips: Arc<dyn TripRepository>,
    store: Arc<dyn SeatLedgerStore>,
}

impl SeatLedger {
    pub fn new(trips: Arc<dyn TripRepository>, store: Arc<dyn SeatLedgerStore>) -> Self {
        Self { trips, store }
    }

    /// Seats held by provisional or confirmed bookings.
    pub async fn list_occupied_seats(&self, trip_id: Uuid) -> CoreResult<Vec<i32>> {
        Ok(self.store.list_occupied_seats(trip_id).await?)
    }

    pub async fn decrement_available_seats(&self, trip_id: Uuid) -> CoreResult<SeatDecrement> {
        let outcome = self.store.decrement_available_seats(trip_id).await?;
        if outcome == SeatDecrement::Refused {
            report_integrity_alarm(trip_id, "direct decrement");
        }
        Ok(outcome)
    }

    pub async fn seat_map(&self, trip_id: Uuid) -> CoreResult<SeatMapSnapshot> {
        let trip = self
            .trips
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("trip {}", trip_id)))?;
        let occupied_seats = self.store.list_occupied_seats(trip_id).await?;

        Ok(SeatMapSnapshot {
            trip_id,
            total_seats: trip.total_seats,
            available_seats: trip.available_seats,
            occupied_seats,
            generated_at: Utc::now().timestamp_millis(),
        })
    }
}

/// The counter refused to go below zero. Either something bypassed the
/// ledger or a confirmation ran twice; both are bugs, not user errors.
pub fn report_integrity_alarm(trip_id: Uuid, context: &str) {
    tracing::error!(
        trip_id = %trip_id,
        "INTEGRITY ALARM: available_seats already zero, decrement refused ({})",
        context
    );
}

