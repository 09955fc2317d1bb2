pub mod auth;
pub mod resiliency;

pub use auth::{auth_middleware, UserClaims};
pub use resiliency::{circuit_breaker_middleware, CircuitBreaker, CircuitState};
