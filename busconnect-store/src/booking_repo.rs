use async_trait::async_trait;
use busconnect_core::booking::{Booking, FareBreakdown, NewBooking, PassengerDetails};
use busconnect_core::repository::{
    BookingRepository, ConfirmPayment, ConfirmationWrite, StoreError, StoreResult,
};
use busconnect_core::booking::BookingStatus;
use busconnect_shared::models::events::{BookingConfirmedEvent, OutboundEvent};
use busconnect_shared::pii::Masked;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::map_sqlx;
use crate::{outbox_repo, trip_repo};

const BOOKING_COLUMNS: &str = "id, trip_id, user_id, seat_number, status, full_name, student_id, \
    student_class, phone, emergency_contact, has_luggage, luggage_count, ticket_amount, \
    insurance_amount, luggage_amount, total_amount, payment_reference, created_at, updated_at";

pub struct StoreBookingRepository {
    pool: PgPool,
}

impl StoreBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    trip_id: Uuid,
    user_id: String,
    seat_number: i32,
    status: String,
    full_name: String,
    student_id: String,
    student_class: String,
    phone: String,
    emergency_contact: String,
    has_luggage: bool,
    luggage_count: i32,
    ticket_amount: i64,
    insurance_amount: i64,
    luggage_amount: i64,
    total_amount: i64,
    payment_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status: BookingStatus = row
            .status
            .parse()
            .map_err(|e: busconnect_core::CoreError| StoreError::Backend(e.to_string()))?;

        Ok(Booking {
            id: row.id,
            trip_id: row.trip_id,
            user_id: row.user_id,
            seat_number: row.seat_number,
            status,
            passenger: PassengerDetails {
                full_name: row.full_name,
                student_id: row.student_id,
                student_class: row.student_class,
                phone: Masked(row.phone),
                emergency_contact: Masked(row.emergency_contact),
                has_luggage: row.has_luggage,
                luggage_count: row.luggage_count.max(0) as u32,
            },
            fare: FareBreakdown {
                ticket_amount: row.ticket_amount,
                insurance_amount: row.insurance_amount,
                luggage_amount: row.luggage_amount,
            },
            total_amount: row.total_amount,
            payment_reference: row.payment_reference,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl BookingRepository for StoreBookingRepository {
    async fn insert_provisional(&self, booking: NewBooking) -> StoreResult<Booking> {
        let booking = booking.into_booking(Uuid::new_v4(), Utc::now());

        let sql = format!(
            r#"
            INSERT INTO bookings (id, trip_id, user_id, seat_number, status, full_name, student_id,
                student_class, phone, emergency_contact, has_luggage, luggage_count, ticket_amount,
                insurance_amount, luggage_amount, total_amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'provisional', $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );

        // The partial unique index on (trip_id, seat_number) rejects a second
        // active booking for the seat with SQLSTATE 23505.
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(booking.id)
            .bind(booking.trip_id)
            .bind(&booking.user_id)
            .bind(booking.seat_number)
            .bind(&booking.passenger.full_name)
            .bind(&booking.passenger.student_id)
            .bind(&booking.passenger.student_class)
            .bind(booking.passenger.phone.expose())
            .bind(booking.passenger.emergency_contact.expose())
            .bind(booking.passenger.has_luggage)
            .bind(booking.passenger.luggage_count as i32)
            .bind(booking.fare.ticket_amount)
            .bind(booking.fare.insurance_amount)
            .bind(booking.fare.luggage_amount)
            .bind(booking.total_amount)
            .bind(booking.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Booking::try_from(row)
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        row.map(Booking::try_from).transpose()
    }

    async fn confirm_paid_booking(&self, confirm: &ConfirmPayment) -> StoreResult<ConfirmationWrite> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // 1. Conditional transition. Zero rows means someone else got here first
        // or the booking is no longer provisional.
        let sql = format!(
            r#"
            UPDATE bookings
            SET status = 'confirmed', payment_reference = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'provisional'
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(confirm.booking_id)
            .bind(&confirm.reference)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        let booking = match row {
            Some(row) => Booking::try_from(row)?,
            None => {
                tx.rollback().await.map_err(map_sqlx)?;
                let current = self
                    .get_booking(confirm.booking_id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(format!("booking {}", confirm.booking_id)))?;
                return match current.status {
                    BookingStatus::Confirmed => Ok(ConfirmationWrite::AlreadyConfirmed(current)),
                    BookingStatus::Cancelled => Ok(ConfirmationWrite::NotConfirmable(current)),
                    BookingStatus::Provisional => Err(StoreError::Backend(format!(
                        "booking {} stayed provisional after conditional confirm",
                        current.id
                    ))),
                };
            }
        };

        // 2. Payment record success. A reference we never recorded (e.g. a
        // charge opened from another device) gets a row now.
        let updated = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'success', gateway_response = $3, error_code = NULL, error_message = NULL, updated_at = NOW()
            WHERE gateway_reference = $1 AND booking_id = $2
            "#,
        )
        .bind(&confirm.reference)
        .bind(booking.id)
        .bind(&confirm.gateway_response)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO payments (id, booking_id, gateway_reference, amount, channel, status, gateway_response)
                VALUES ($1, $2, $3, $4, 'card', 'success', $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(booking.id)
            .bind(&confirm.reference)
            .bind(confirm.amount_paid)
            .bind(&confirm.gateway_response)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }

        // 3. Seat counter
        let seats = trip_repo::decrement_available_seats(&mut *tx, booking.trip_id)
            .await
            .map_err(map_sqlx)?;

        // 4. Notification outbox
        let event = OutboundEvent::BookingConfirmed(BookingConfirmedEvent {
            booking_id: booking.id,
            trip_id: booking.trip_id,
            user_id: booking.user_id.clone(),
            seat_number: booking.seat_number,
            passenger_name: booking.passenger.full_name.clone(),
            total_amount: booking.total_amount,
            payment_reference: confirm.reference.clone(),
            timestamp: Utc::now().timestamp(),
        });
        outbox_repo::insert_event(&mut *tx, &event).await.map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;

        Ok(ConfirmationWrite::Performed { booking, seats })
    }

    async fn cancel_stale_provisional(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        // Bookings with a successful or recent payment attempt are left alone.
        let sql = format!(
            r#"
            UPDATE bookings
            SET status = 'cancelled', updated_at = NOW()
            WHERE status = 'provisional'
              AND created_at < $1
              AND NOT EXISTS (
                  SELECT 1 FROM payments p
                  WHERE p.booking_id = bookings.id
                    AND (p.status = 'success' OR p.created_at >= $1)
              )
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );

        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        rows.into_iter().map(Booking::try_from).collect()
    }
}
