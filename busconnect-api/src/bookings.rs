use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use busconnect_booking::ReserveSeatRequest;
use busconnect_core::booking::{Booking, BookingStatus, FareBreakdown};
use busconnect_core::identity::Caller;
use busconnect_core::CoreError;
use busconnect_shared::models::events::SeatMapSnapshot;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub booking_id: Uuid,
    pub status: BookingStatus,
    pub seat_number: i32,
    pub total_amount: i64,
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub seat_number: i32,
    pub status: BookingStatus,
    pub passenger_name: String,
    pub fare: FareBreakdown,
    pub total_amount: i64,
    pub currency: String,
    pub payment_reference: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl BookingResponse {
    fn from_booking(booking: Booking, currency: &str) -> Self {
        Self {
            id: booking.id,
            trip_id: booking.trip_id,
            seat_number: booking.seat_number,
            status: booking.status,
            passenger_name: booking.passenger.full_name,
            fare: booking.fare,
            total_amount: booking.total_amount,
            currency: currency.to_string(),
            payment_reference: booking.payment_reference,
            created_at: booking.created_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /v1/trips/{trip_id}/seats
pub async fn get_seat_map(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<SeatMapSnapshot>, AppError> {
    Ok(Json(state.engine.ledger.seat_map(trip_id).await?))
}

/// POST /v1/trips/{trip_id}/bookings
pub async fn reserve_seat(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<ReserveSeatRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), AppError> {
    match state.engine.reservations.reserve_seat(&caller, trip_id, req).await {
        Ok(booking) => {
            state.metrics.bookings_reserved.inc();
            Ok((
                StatusCode::CREATED,
                Json(ReservationResponse {
                    booking_id: booking.id,
                    status: booking.status,
                    seat_number: booking.seat_number,
                    total_amount: booking.total_amount,
                    currency: state.currency.clone(),
                }),
            ))
        }
        Err(e) => {
            if matches!(e, CoreError::SeatConflict { .. }) {
                state.metrics.seat_conflicts.inc();
            }
            Err(e.into())
        }
    }
}

/// GET /v1/bookings/{booking_id}
pub async fn get_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.engine.reservations.get_booking(&caller, booking_id).await?;
    Ok(Json(BookingResponse::from_booking(booking, &state.currency)))
}
