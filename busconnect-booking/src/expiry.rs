use busconnect_core::repository::BookingRepository;
use busconnect_core::CoreResult;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::feed::ChangeFeed;

/// Releases seats held by provisional bookings that never got paid. Only
/// runs when a TTL is configured.
pub struct ProvisionalExpiry {
    bookings: Arc<dyn BookingRepository>,
    feed: ChangeFeed,
    ttl: Duration,
}

impl ProvisionalExpiry {
    pub fn new(bookings: Arc<dyn BookingRepository>, feed: ChangeFeed, ttl: Duration) -> Self {
        Self { bookings, feed, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cancels provisional bookings created before `now - ttl` and returns how
    /// many were cancelled. `available_seats` is left alone: provisional
    /// bookings never counted against it.
    pub async fn sweep(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(ttl).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let expired = self.bookings.cancel_stale_provisional(cutoff).await?;
        if expired.is_empty() {
            return Ok(0);
        }

        let trips: BTreeSet<_> = expired.iter().map(|b| b.trip_id).collect();
        for booking in &expired {
            tracing::info!(
                "Expired provisional booking {} (seat {} on trip {})",
                booking.id,
                booking.seat_number,
                booking.trip_id
            );
        }
        for trip_id in trips {
            self.feed.publish_trip(trip_id).await;
        }

        Ok(expired.len())
    }
}
