use async_trait::async_trait;
use busconnect_core::repository::{OutboxEntry, OutboxRepository, StoreError, StoreResult};
use busconnect_shared::models::events::OutboundEvent;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::database::map_sqlx;

pub struct StoreOutboxRepository {
    pool: PgPool,
}

impl StoreOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

pub(crate) async fn insert_event<'e, E>(executor: E, event: &OutboundEvent) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let payload = serde_json::to_value(event).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        r#"
        INSERT INTO notification_outbox (id, topic, event_key, payload)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(event.topic())
    .bind(event.key())
    .bind(payload)
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl OutboxRepository for StoreOutboxRepository {
    async fn enqueue(&self, event: &OutboundEvent) -> StoreResult<()> {
        insert_event(&self.pool, event).await.map_err(map_sqlx)
    }

    async fn fetch_undispatched(&self, limit: i64) -> StoreResult<Vec<OutboxEntry>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, payload, created_at
            FROM notification_outbox
            WHERE dispatched_at IS NULL
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter()
            .map(|row| {
                let event: OutboundEvent = serde_json::from_value(row.payload)
                    .map_err(|e| StoreError::Backend(format!("outbox row {}: {}", row.id, e)))?;
                Ok(OutboxEntry {
                    id: row.id,
                    event,
                    created_at: row.created_at,
                })
            })
            .collect()
    }

    async fn mark_dispatched(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE notification_outbox SET dispatched_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}
