use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use busconnect_core::CoreError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    UnprocessableError(String),
    GatewayError {
        message: String,
        hint: Option<String>,
        reference: Option<String>,
    },
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::UnprocessableError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, json!({ "error": msg })),
            AppError::GatewayError { message, hint, reference } => (
                StatusCode::BAD_GATEWAY,
                json!({ "error": message, "hint": hint, "reference": reference }),
            ),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::SeatConflict { .. } => AppError::ConflictError(err.to_string()),
            CoreError::InvalidTripState(_) => AppError::UnprocessableError(err.to_string()),
            CoreError::BookingNotPayable(_) => AppError::ConflictError(err.to_string()),
            CoreError::ValidationError(_) => AppError::ValidationError(err.to_string()),
            CoreError::Unauthorized | CoreError::InvalidSignature => AppError::AuthenticationError(err.to_string()),
            // Never say whose booking it is.
            CoreError::Forbidden => AppError::AuthorizationError(err.to_string()),
            CoreError::NotFound(_) => AppError::NotFoundError(err.to_string()),
            CoreError::GatewayError { message, hint, reference } => AppError::GatewayError { message, hint, reference },
            CoreError::StorageError(_) | CoreError::InternalError(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_core_errors_map_to_status_codes() {
        let cases = [
            (CoreError::SeatConflict { trip_id: Uuid::new_v4(), seat_number: 3 }, StatusCode::CONFLICT),
            (CoreError::InvalidTripState("trip has departed".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (CoreError::ValidationError("seat".into()), StatusCode::BAD_REQUEST),
            (CoreError::Forbidden, StatusCode::FORBIDDEN),
            (CoreError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (CoreError::BookingNotPayable("cancelled".into()), StatusCode::CONFLICT),
            (CoreError::StorageError("connection reset".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
