use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

use crate::state::AppState;

/// Counters exposed on `/metrics`. Each instance owns its registry so
/// routers built in tests do not collide on the global one.
pub struct ApiMetrics {
    registry: Registry,
    pub bookings_reserved: IntCounter,
    pub seat_conflicts: IntCounter,
    pub confirmations: IntCounter,
    pub integrity_alarms: IntCounter,
    pub webhook_rejections: IntCounter,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let bookings_reserved = counter("busconnect_bookings_reserved_total", "Provisional bookings created")?;
        let seat_conflicts = counter("busconnect_seat_conflicts_total", "Reservations rejected because the seat was taken")?;
        let confirmations = counter("busconnect_confirmations_total", "Bookings moved from provisional to confirmed")?;
        let integrity_alarms = counter(
            "busconnect_integrity_alarms_total",
            "Seat decrements refused because available_seats was already zero",
        )?;
        let webhook_rejections = counter(
            "busconnect_webhook_rejections_total",
            "Webhook deliveries rejected for a missing or invalid signature",
        )?;

        Ok(Self {
            registry,
            bookings_reserved,
            seat_conflicts,
            confirmations,
            integrity_alarms,
            webhook_rejections,
        })
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        let metrics = ApiMetrics::new().unwrap();
        metrics.seat_conflicts.inc();
        metrics.seat_conflicts.inc();
        let text = metrics.render().unwrap();
        assert!(text.contains("busconnect_seat_conflicts_total 2"));
        assert!(text.contains("busconnect_integrity_alarms_total 0"));
    }
}
