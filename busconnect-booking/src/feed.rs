use busconnect_shared::models::events::{BookingChange, SeatMapSnapshot};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::ledger::SeatLedger;

/// Pushes fresh seat maps to subscribers whenever a booking on a trip changes.
/// Advisory only: a lagging or missing subscriber never blocks a writer, and
/// duplicate snapshots are harmless.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<SeatMapSnapshot>,
    ledger: Arc<SeatLedger>,
}

impl ChangeFeed {
    pub fn new(ledger: Arc<SeatLedger>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, ledger }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SeatMapSnapshot> {
        self.tx.subscribe()
    }

    pub async fn current(&self, trip_id: Uuid) -> busconnect_core::CoreResult<SeatMapSnapshot> {
        self.ledger.seat_map(trip_id).await
    }

    /// Re-derives the seat map for `trip_id` and broadcasts it.
    pub async fn publish_trip(&self, trip_id: Uuid) {
        match self.ledger.seat_map(trip_id).await {
            Ok(snapshot) => {
                // No receivers is fine.
                let receivers = self.tx.send(snapshot).unwrap_or(0);
                tracing::debug!("Seat map for trip {} sent to {} subscribers", trip_id, receivers);
            }
            Err(e) => tracing::warn!("Could not rebuild seat map for trip {}: {}", trip_id, e),
        }
    }

    /// Republishes every change that arrives on `changes`, e.g. from the
    /// database notification listener.
    pub fn spawn_bridge(&self, mut changes: mpsc::Receiver<BookingChange>) -> JoinHandle<()> {
        let feed = self.clone();
        tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                tracing::debug!("Booking {} on trip {} is now {}", change.booking_id, change.trip_id, change.status);
                feed.publish_trip(change.trip_id).await;
            }
        })
    }
}
