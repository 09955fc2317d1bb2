use async_trait::async_trait;
use busconnect_shared::models::events::OutboundEvent;

/// Delivers outbox events to notification and reporting collaborators.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OutboundEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Publisher that only logs. Used when no broker is configured.
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &OutboundEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!("Outbound event {} for key {}", event.topic(), event.key());
        Ok(())
    }
}
