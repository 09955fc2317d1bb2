use busconnect_shared::models::events::BookingChange;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Channel the `bookings_notify_change` trigger publishes on.
pub const BOOKING_CHANGES_CHANNEL: &str = "booking_changes";

/// Forwards `pg_notify` payloads from the bookings trigger until the receiver
/// goes away. PgListener reconnects on its own after a dropped connection;
/// notifications sent during the gap are lost, which the feed tolerates.
pub async fn forward_booking_changes(pool: &PgPool, tx: mpsc::Sender<BookingChange>) -> Result<(), sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(BOOKING_CHANGES_CHANNEL).await?;
    info!("Listening for booking changes on '{}'", BOOKING_CHANGES_CHANNEL);

    loop {
        let notification = listener.recv().await?;
        match serde_json::from_str::<BookingChange>(notification.payload()) {
            Ok(change) => {
                if tx.send(change).await.is_err() {
                    info!("Booking change receiver dropped, stopping listener");
                    return Ok(());
                }
            }
            Err(e) => warn!("Ignoring malformed booking change payload: {}", e),
        }
    }
}
