use std::sync::Arc;
use std::time::Duration;
use busconnect_booking::BookingEngine;
use busconnect_store::RedisClient;

use crate::metrics::ApiMetrics;
use crate::middleware::resiliency::CircuitBreaker;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct RateLimitConfig {
    pub per_minute: i64,
}

pub struct ResiliencyState {
    pub payment_cb: CircuitBreaker,
}

impl Default for ResiliencyState {
    fn default() -> Self {
        Self {
            payment_cb: CircuitBreaker::new("payment_gateway", 5, Duration::from_secs(30)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
    /// Rate limiting is skipped when unset.
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
    pub currency: String,
    pub metrics: Arc<ApiMetrics>,
    pub resiliency: Arc<ResiliencyState>,
}
