use async_trait::async_trait;
use busconnect_core::repository::{SeatDecrement, SeatLedgerStore, StoreError, StoreResult, TripRepository};
use busconnect_core::trip::Trip;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::database::map_sqlx;

pub struct StoreTripRepository {
    pool: PgPool,
}

impl StoreTripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    origin: String,
    destination: String,
    organizer_id: String,
    departure_date: chrono::NaiveDate,
    price: i64,
    total_seats: i32,
    available_seats: i32,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = StoreError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        Ok(Trip {
            id: row.id,
            origin: row.origin,
            destination: row.destination,
            organizer_id: row.organizer_id,
            departure_date: row.departure_date,
            price: row.price,
            total_seats: row.total_seats,
            available_seats: row.available_seats,
            status: row.status.parse().map_err(|e: busconnect_core::CoreError| StoreError::Backend(e.to_string()))?,
            created_at: row.created_at,
        })
    }
}

/// Conditional decrement. The `available_seats > 0` predicate and the row lock
/// taken by UPDATE serialize concurrent confirmations on one trip.
pub(crate) async fn decrement_available_seats<'e, E>(executor: E, trip_id: Uuid) -> Result<SeatDecrement, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let remaining: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE trips
        SET available_seats = available_seats - 1
        WHERE id = $1 AND available_seats > 0
        RETURNING available_seats
        "#,
    )
    .bind(trip_id)
    .fetch_optional(executor)
    .await?;

    Ok(match remaining {
        Some(remaining) => SeatDecrement::Applied { remaining },
        None => SeatDecrement::Refused,
    })
}

#[async_trait]
impl TripRepository for StoreTripRepository {
    async fn get_trip(&self, id: Uuid) -> StoreResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(
            r#"
            SELECT id, origin, destination, organizer_id, departure_date, price,
                   total_seats, available_seats, status, created_at
            FROM trips
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(Trip::try_from).transpose()
    }
}

#[async_trait]
impl SeatLedgerStore for StoreTripRepository {
    async fn list_occupied_seats(&self, trip_id: Uuid) -> StoreResult<Vec<i32>> {
        sqlx::query_scalar::<_, i32>(
            r#"
            SELECT seat_number
            FROM bookings
            WHERE trip_id = $1 AND status IN ('provisional', 'confirmed')
            ORDER BY seat_number
            "#,
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn decrement_available_seats(&self, trip_id: Uuid) -> StoreResult<SeatDecrement> {
        decrement_available_seats(&self.pool, trip_id).await.map_err(map_sqlx)
    }
}
