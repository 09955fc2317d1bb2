use async_trait::async_trait;
use busconnect_core::payment::{PaymentChannel, PaymentRecord};
use busconnect_core::repository::{PaymentRepository, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::map_sqlx;

pub struct StorePaymentRepository {
    pool: PgPool,
}

impl StorePaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    gateway_reference: String,
    amount: i64,
    channel: String,
    status: String,
    error_code: Option<String>,
    error_message: Option<String>,
    gateway_response: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let channel = match row.channel.as_str() {
            "mobile_money" => PaymentChannel::MobileMoney,
            _ => PaymentChannel::Card,
        };
        Ok(PaymentRecord {
            id: row.id,
            booking_id: row.booking_id,
            gateway_reference: row.gateway_reference,
            amount: row.amount,
            channel,
            status: row
                .status
                .parse()
                .map_err(|e: busconnect_core::CoreError| StoreError::Backend(e.to_string()))?,
            error_code: row.error_code,
            error_message: row.error_message,
            gateway_response: row.gateway_response,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl PaymentRepository for StorePaymentRepository {
    async fn insert_payment(&self, record: &PaymentRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, booking_id, gateway_reference, amount, channel, status,
                error_code, error_message, gateway_response, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(record.booking_id)
        .bind(&record.gateway_reference)
        .bind(record.amount)
        .bind(record.channel.as_str())
        .bind(record.status.as_str())
        .bind(&record.error_code)
        .bind(&record.error_message)
        .bind(&record.gateway_response)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, booking_id, gateway_reference, amount, channel, status,
                   error_code, error_message, gateway_response, created_at, updated_at
            FROM payments
            WHERE gateway_reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(PaymentRecord::try_from).transpose()
    }

    async fn mark_failed(
        &self,
        reference: &str,
        error_code: &str,
        gateway_response: &serde_json::Value,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'failed', error_code = $2, gateway_response = $3, updated_at = NOW()
            WHERE gateway_reference = $1 AND status = 'pending'
            "#,
        )
        .bind(reference)
        .bind(error_code)
        .bind(gateway_response)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() > 0)
    }
}
