use busconnect_shared::pii::Masked;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Provisional,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Provisional => "provisional",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Provisional and confirmed bookings both hold their seat.
    pub fn holds_seat(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provisional" => Ok(BookingStatus::Provisional),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(CoreError::InternalError(format!("unknown booking status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassengerDetails {
    pub full_name: String,
    pub student_id: String,
    pub student_class: String,
    pub phone: Masked<String>,
    pub emergency_contact: Masked<String>,
    #[serde(default)]
    pub has_luggage: bool,
    #[serde(default)]
    pub luggage_count: u32,
}

impl PassengerDetails {
    /// Trims every text field and rejects blanks.
    pub fn normalized(mut self) -> Result<Self, CoreError> {
        let required = [
            ("full_name", &mut self.full_name),
            ("student_id", &mut self.student_id),
            ("student_class", &mut self.student_class),
            ("phone", &mut self.phone.0),
            ("emergency_contact", &mut self.emergency_contact.0),
        ];
        for (name, value) in required {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                return Err(CoreError::ValidationError(format!("{} is required", name)));
            }
            *value = trimmed;
        }
        if !self.has_luggage {
            self.luggage_count = 0;
        }
        Ok(self)
    }
}

/// Amounts frozen on the booking at reservation time, in minor units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FareBreakdown {
    pub ticket_amount: i64,
    pub insurance_amount: i64,
    pub luggage_amount: i64,
}

impl FareBreakdown {
    pub fn total(&self) -> i64 {
        self.ticket_amount + self.insurance_amount + self.luggage_amount
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: String,
    pub seat_number: i32,
    pub status: BookingStatus,
    pub passenger: PassengerDetails,
    pub fare: FareBreakdown,
    pub total_amount: i64,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to the storage layer's provisional insert.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub trip_id: Uuid,
    pub user_id: String,
    pub seat_number: i32,
    pub passenger: PassengerDetails,
    pub fare: FareBreakdown,
}

impl NewBooking {
    pub fn into_booking(self, id: Uuid, now: DateTime<Utc>) -> Booking {
        Booking {
            id,
            trip_id: self.trip_id,
            user_id: self.user_id,
            seat_number: self.seat_number,
            status: BookingStatus::Provisional,
            passenger: self.passenger,
            total_amount: self.fare.total(),
            fare: self.fare,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passenger() -> PassengerDetails {
        PassengerDetails {
            full_name: "  Ama Mensah ".to_string(),
            student_id: "10234567".to_string(),
            student_class: "Level 300".to_string(),
            phone: Masked("0241234567".to_string()),
            emergency_contact: Masked("0201112222".to_string()),
            has_luggage: false,
            luggage_count: 4,
        }
    }

    #[test]
    fn test_normalized_trims_and_clears_luggage() {
        let p = passenger().normalized().unwrap();
        assert_eq!(p.full_name, "Ama Mensah");
        assert_eq!(p.luggage_count, 0);
    }

    #[test]
    fn test_normalized_rejects_blank_fields() {
        let mut p = passenger();
        p.student_id = "   ".to_string();
        let err = p.normalized().unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(msg) if msg.contains("student_id")));
    }

    #[test]
    fn test_cancelled_does_not_hold_seat() {
        assert!(BookingStatus::Provisional.holds_seat());
        assert!(BookingStatus::Confirmed.holds_seat());
        assert!(!BookingStatus::Cancelled.holds_seat());
    }
}
