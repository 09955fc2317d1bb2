use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use busconnect_shared::models::events::SeatMapSnapshot;
use futures_util::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

fn seat_map_event(snapshot: &SeatMapSnapshot) -> Option<Event> {
    match Event::default().event("seat_map").json_data(snapshot) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("Could not encode seat map for trip {}: {}", snapshot.trip_id, e);
            None
        }
    }
}

/// GET /v1/trips/{trip_id}/stream
/// Current seat map first, then every change for this trip. Lagged
/// subscribers skip what they missed; the next snapshot is complete anyway.
pub async fn stream_seat_map(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Subscribe before reading so nothing between the two is lost.
    let rx = state.engine.feed.subscribe();
    let current = state.engine.feed.current(trip_id).await?;

    let initial = stream::iter(seat_map_event(&current).map(Ok));
    let updates = BroadcastStream::new(rx).filter_map(move |msg| async move {
        match msg {
            Ok(snapshot) if snapshot.trip_id == trip_id => seat_map_event(&snapshot).map(Ok),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Seat map subscriber for trip {} lagged: {}", trip_id, e);
                None
            }
        }
    });

    Ok(Sse::new(initial.chain(updates)).keep_alive(KeepAlive::default()))
}
