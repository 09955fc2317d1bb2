use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use busconnect_booking::{ChangeFeed, ProvisionalExpiry};
use busconnect_core::notification::EventPublisher;
use busconnect_core::repository::{OutboxRepository, StoreResult};
use busconnect_store::DbClient;
use tracing::{info, error, warn};

const OUTBOX_BATCH: i64 = 50;

/// Publishes one batch of undelivered outbox rows. Stops at the first
/// publish failure so later events for the same booking never overtake it.
pub async fn relay_outbox_once(
    outbox: &dyn OutboxRepository,
    publisher: &dyn EventPublisher,
) -> StoreResult<usize> {
    let entries = outbox.fetch_undispatched(OUTBOX_BATCH).await?;
    let mut dispatched = 0;

    for entry in entries {
        if let Err(e) = publisher.publish(&entry.event).await {
            warn!("Outbox event {} ({}) not delivered yet: {}", entry.id, entry.event.topic(), e);
            break;
        }
        outbox.mark_dispatched(entry.id).await?;
        dispatched += 1;
    }

    Ok(dispatched)
}

pub async fn start_outbox_relay(
    outbox: Arc<dyn OutboxRepository>,
    publisher: Arc<dyn EventPublisher>,
    interval: Duration,
) {
    info!("Outbox relay started, polling every {:?}", interval);
    loop {
        match relay_outbox_once(outbox.as_ref(), publisher.as_ref()).await {
            Ok(0) => {}
            Ok(n) => info!("Relayed {} outbox events", n),
            Err(e) => error!("Outbox relay failed: {}", e),
        }
        sleep(interval).await;
    }
}

pub async fn start_expiry_sweeper(expiry: Arc<ProvisionalExpiry>, interval: Duration) {
    info!(
        "Provisional expiry sweeper started (ttl {:?}, every {:?})",
        expiry.ttl(),
        interval
    );
    loop {
        sleep(interval).await;
        match expiry.sweep(chrono::Utc::now()).await {
            Ok(0) => {}
            Ok(n) => info!("Released {} stale provisional bookings", n),
            Err(e) => error!("Expiry sweep failed: {}", e),
        }
    }
}

/// Bridges Postgres `booking_changes` notifications into the change feed,
/// reconnecting after failures.
pub async fn start_change_listener(db: DbClient, feed: ChangeFeed) {
    let (tx, rx) = mpsc::channel(256);
    let _bridge = feed.spawn_bridge(rx);

    loop {
        match busconnect_store::listener::forward_booking_changes(&db.pool, tx.clone()).await {
            Ok(()) => return,
            Err(e) => {
                error!("Booking change listener failed: {}. Reconnecting in 5s", e);
                sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use busconnect_shared::models::events::{OutboundEvent, PaymentFailedEvent};
    use busconnect_store::InMemoryStore;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingPublisher {
        fail: bool,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: &OutboundEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if self.fail {
                return Err("broker down".into());
            }
            self.sent.lock().unwrap().push(event.topic().to_string());
            Ok(())
        }
    }

    fn failed_event() -> OutboundEvent {
        OutboundEvent::PaymentFailed(PaymentFailedEvent {
            booking_id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            payment_reference: "BUS-1".to_string(),
            gateway_status: "failed".to_string(),
            timestamp: 0,
        })
    }

    #[tokio::test]
    async fn test_relay_marks_delivered_events() {
        let store = InMemoryStore::new();
        store.enqueue(&failed_event()).await.unwrap();
        store.enqueue(&failed_event()).await.unwrap();

        let publisher = RecordingPublisher::default();
        assert_eq!(relay_outbox_once(&store, &publisher).await.unwrap(), 2);
        assert_eq!(publisher.sent.lock().unwrap().as_slice(), ["payment.failed", "payment.failed"]);
        assert_eq!(relay_outbox_once(&store, &publisher).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_relay_keeps_events_when_publish_fails() {
        let store = InMemoryStore::new();
        store.enqueue(&failed_event()).await.unwrap();

        let broken = RecordingPublisher { fail: true, ..Default::default() };
        assert_eq!(relay_outbox_once(&store, &broken).await.unwrap(), 0);
        assert_eq!(store.fetch_undispatched(10).await.unwrap().len(), 1);
    }
}
