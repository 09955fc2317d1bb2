mod common;

use async_trait::async_trait;
use busconnect_booking::{ChangeFeed, FareSchedule, ReservationService, SeatLedger};
use busconnect_core::booking::BookingStatus;
use busconnect_core::repository::{SeatDecrement, SeatLedgerStore, StoreResult};
use busconnect_core::trip::TripStatus;
use busconnect_core::CoreError;
use busconnect_store::InMemoryStore;
use chrono::NaiveDate;
use common::*;
use std::sync::Arc;
use uuid::Uuid;

/// Reports every seat as free so only the storage constraint can catch a
/// double booking.
struct BlindSeats(Arc<InMemoryStore>);

#[async_trait]
impl SeatLedgerStore for BlindSeats {
    async fn list_occupied_seats(&self, _trip_id: Uuid) -> StoreResult<Vec<i32>> {
        Ok(Vec::new())
    }

    async fn decrement_available_seats(&self, trip_id: Uuid) -> StoreResult<SeatDecrement> {
        self.0.decrement_available_seats(trip_id).await
    }
}

#[tokio::test]
async fn test_reserve_creates_provisional_booking_without_touching_counter() {
    let h = harness();
    let trip_id = seed_trip(&h, 50, 12000).await;

    let booking = h
        .engine
        .reservations
        .reserve_seat(&student("kofi"), trip_id, seat(12, "Kofi Boateng"))
        .await
        .unwrap();

    assert_eq!(booking.status, BookingStatus::Provisional);
    assert_eq!(booking.total_amount, 15000);
    assert_eq!(h.store.trip(trip_id).await.unwrap().available_seats, 50);
    assert_eq!(h.engine.ledger.list_occupied_seats(trip_id).await.unwrap(), vec![12]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reservations_for_same_seat() {
    let h = harness();
    let trip_id = seed_trip(&h, 40, 12000).await;

    let alice = student("alice");
    let bob = student("bob");
    let (a, b) = tokio::join!(
        h.engine.reservations.reserve_seat(&alice, trip_id, seat(5, "Alice Asante")),
        h.engine.reservations.reserve_seat(&bob, trip_id, seat(5, "Bob Badu")),
    );

    let results = [a, b];
    let won = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(CoreError::SeatConflict { seat_number: 5, .. })))
        .count();
    assert_eq!((won, conflicts), (1, 1));

    let occupied = h.engine.ledger.list_occupied_seats(trip_id).await.unwrap();
    assert_eq!(occupied.iter().filter(|s| **s == 5).count(), 1);
}

#[tokio::test]
async fn test_storage_constraint_rejects_double_booking_without_precheck() {
    let h = harness();
    let trip_id = seed_trip(&h, 40, 12000).await;

    let blind: Arc<dyn SeatLedgerStore> = Arc::new(BlindSeats(h.store.clone()));
    let ledger = Arc::new(SeatLedger::new(h.store.clone(), blind));
    let feed = ChangeFeed::new(ledger.clone(), 4);
    let service = ReservationService::new(h.store.clone(), h.store.clone(), ledger, FareSchedule::default(), feed);

    service
        .reserve_seat(&student("alice"), trip_id, seat(7, "Alice Asante"))
        .await
        .unwrap();
    let err = service
        .reserve_seat(&student("bob"), trip_id, seat(7, "Bob Badu"))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::SeatConflict { seat_number: 7, .. }));
    assert_eq!(h.store.bookings_for_trip(trip_id).await.len(), 1);
}

#[tokio::test]
async fn test_trip_state_and_seat_range_are_checked() {
    let h = harness();

    let mut pending = trip(20, 9000);
    pending.status = TripStatus::Pending;
    let pending_id = pending.id;
    h.store.insert_trip(pending).await;
    let err = h
        .engine
        .reservations
        .reserve_seat(&student("ama"), pending_id, seat(1, "Ama Mensah"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTripState(_)));

    let trip_id = seed_trip(&h, 20, 9000).await;
    let after_departure = NaiveDate::from_ymd_opt(2031, 1, 1).unwrap();
    let err = h
        .engine
        .reservations
        .reserve_seat_on(&student("ama"), trip_id, seat(1, "Ama Mensah"), after_departure)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTripState(msg) if msg.contains("departed")));

    for bad_seat in [0, 21] {
        let err = h
            .engine
            .reservations
            .reserve_seat(&student("ama"), trip_id, seat(bad_seat, "Ama Mensah"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    let err = h
        .engine
        .reservations
        .reserve_seat(&student("ama"), Uuid::new_v4(), seat(1, "Ama Mensah"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn test_price_change_does_not_reprice_existing_booking() {
    let h = harness();
    let trip_id = seed_trip(&h, 30, 10000).await;

    let mut request = seat(3, "Yaw Darko");
    request.passenger.has_luggage = true;
    request.passenger.luggage_count = 5;
    let booking = h
        .engine
        .reservations
        .reserve_seat(&student("yaw"), trip_id, request)
        .await
        .unwrap();
    assert_eq!(booking.total_amount, 10000 + 3000 + 500);

    h.store.set_trip_price(trip_id, 25000).await;

    let stored = h.engine.reservations.get_booking(&student("yaw"), booking.id).await.unwrap();
    assert_eq!(stored.total_amount, 13500);
    assert_eq!(stored.fare.ticket_amount, 10000);
}

#[tokio::test]
async fn test_get_booking_is_owner_or_admin_only() {
    let h = harness();
    let trip_id = seed_trip(&h, 30, 10000).await;
    let booking = h
        .engine
        .reservations
        .reserve_seat(&student("esi"), trip_id, seat(9, "Esi Owusu"))
        .await
        .unwrap();

    assert!(h.engine.reservations.get_booking(&student("esi"), booking.id).await.is_ok());
    assert!(h.engine.reservations.get_booking(&admin(), booking.id).await.is_ok());
    assert!(matches!(
        h.engine.reservations.get_booking(&student("kwame"), booking.id).await,
        Err(CoreError::Forbidden)
    ));
    assert!(matches!(
        h.engine.reservations.get_booking(&admin(), Uuid::new_v4()).await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_reservation_is_pushed_to_feed() {
    let h = harness();
    let trip_id = seed_trip(&h, 10, 8000).await;
    let mut rx = h.engine.feed.subscribe();

    h.engine
        .reservations
        .reserve_seat(&student("abena"), trip_id, seat(4, "Abena Ofori"))
        .await
        .unwrap();

    let snapshot = rx.recv().await.unwrap();
    assert_eq!(snapshot.trip_id, trip_id);
    assert_eq!(snapshot.occupied_seats, vec![4]);
    assert_eq!(snapshot.available_seats, 10);
}

#[tokio::test]
async fn test_ledger_decrement_stops_at_zero() {
    let h = harness();
    let trip_id = seed_trip(&h, 2, 12000).await;

    assert_eq!(
        h.engine.ledger.decrement_available_seats(trip_id).await.unwrap(),
        SeatDecrement::Applied { remaining: 1 }
    );
    assert_eq!(
        h.engine.ledger.decrement_available_seats(trip_id).await.unwrap(),
        SeatDecrement::Applied { remaining: 0 }
    );
    // Alarm case: refused, logged, and the counter stays put.
    assert_eq!(
        h.engine.ledger.decrement_available_seats(trip_id).await.unwrap(),
        SeatDecrement::Refused
    );

    let map = h.engine.ledger.seat_map(trip_id).await.unwrap();
    assert_eq!(map.available_seats, 0);
    assert_eq!(map.total_seats, 2);
}
