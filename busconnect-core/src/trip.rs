use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Pending,
    Approved,
    Denied,
    Cancelled,
    Completed,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Pending => "pending",
            TripStatus::Approved => "approved",
            TripStatus::Denied => "denied",
            TripStatus::Cancelled => "cancelled",
            TripStatus::Completed => "completed",
        }
    }
}

impl FromStr for TripStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TripStatus::Pending),
            "approved" => Ok(TripStatus::Approved),
            "denied" => Ok(TripStatus::Denied),
            "cancelled" => Ok(TripStatus::Cancelled),
            "completed" => Ok(TripStatus::Completed),
            other => Err(CoreError::InternalError(format!("unknown trip status '{}'", other))),
        }
    }
}

/// A campus bus trip. `available_seats` is owned by the seat ledger and only
/// ever moves through its conditional decrement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub origin: String,
    pub destination: String,
    pub organizer_id: String,
    pub departure_date: NaiveDate,
    pub price: i64, // minor units (pesewas)
    pub total_seats: i32,
    pub available_seats: i32,
    pub status: TripStatus,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    /// Only approved trips that have not left yet accept reservations.
    pub fn ensure_bookable(&self, today: NaiveDate) -> Result<(), CoreError> {
        if self.status != TripStatus::Approved {
            return Err(CoreError::InvalidTripState(format!(
                "trip is {}, not approved",
                self.status.as_str()
            )));
        }
        if self.departure_date < today {
            return Err(CoreError::InvalidTripState("trip has departed".to_string()));
        }
        Ok(())
    }

    pub fn seat_in_range(&self, seat_number: i32) -> bool {
        seat_number >= 1 && seat_number <= self.total_seats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(status: TripStatus, departure_date: NaiveDate) -> Trip {
        Trip {
            id: Uuid::new_v4(),
            origin: "Legon".to_string(),
            destination: "Kumasi".to_string(),
            organizer_id: "org-1".to_string(),
            departure_date,
            price: 12000,
            total_seats: 50,
            available_seats: 50,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_only_approved_future_trips_are_bookable() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let tomorrow = NaiveDate::from_ymd_opt(2026, 3, 11).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();

        assert!(trip(TripStatus::Approved, tomorrow).ensure_bookable(today).is_ok());
        assert!(trip(TripStatus::Approved, today).ensure_bookable(today).is_ok());

        for status in [TripStatus::Pending, TripStatus::Denied, TripStatus::Cancelled, TripStatus::Completed] {
            let err = trip(status, tomorrow).ensure_bookable(today).unwrap_err();
            assert!(matches!(err, CoreError::InvalidTripState(_)));
        }

        let err = trip(TripStatus::Approved, yesterday).ensure_bookable(today).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTripState(_)));
    }

    #[test]
    fn test_seat_range() {
        let t = trip(TripStatus::Approved, NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
        assert!(!t.seat_in_range(0));
        assert!(t.seat_in_range(1));
        assert!(t.seat_in_range(50));
        assert!(!t.seat_in_range(51));
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!("approved".parse::<TripStatus>().unwrap(), TripStatus::Approved);
        assert!("boarding".parse::<TripStatus>().is_err());
    }
}
