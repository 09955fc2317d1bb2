pub mod trip;
pub mod booking;
pub mod payment;
pub mod repository;
pub mod identity;
pub mod notification;

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Seat {seat_number} on trip {trip_id} is already taken")]
    SeatConflict { trip_id: Uuid, seat_number: i32 },
    #[error("Trip is not bookable: {0}")]
    InvalidTripState(String),
    #[error("Booking cannot be paid: {0}")]
    BookingNotPayable(String),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("Not allowed to access this resource")]
    Forbidden,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Payment gateway rejected the request: {message}")]
    GatewayError {
        message: String,
        hint: Option<String>,
        reference: Option<String>,
    },
    #[error("Invalid webhook signature")]
    InvalidSignature,
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
