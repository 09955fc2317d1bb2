use busconnect_core::booking::{FareBreakdown, PassengerDetails};
use busconnect_core::trip::Trip;
use serde::{Deserialize, Serialize};

/// Fixed fees added on top of the trip's ticket price. All amounts are in
/// minor units (pesewas).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareSchedule {
    /// Travel-safe insurance, charged on every booking
    pub insurance_fee: i64,
    /// Luggage tagging, charged once the passenger goes over the free allowance
    pub luggage_fee: i64,
    pub max_free_bags: u32,
}

impl Default for FareSchedule {
    fn default() -> Self {
        Self {
            insurance_fee: 3000,
            luggage_fee: 500,
            max_free_bags: 3,
        }
    }
}

impl FareSchedule {
    pub fn new(insurance_fee: i64, luggage_fee: i64, max_free_bags: u32) -> Self {
        Self {
            insurance_fee,
            luggage_fee,
            max_free_bags,
        }
    }

    pub fn luggage_fee_for(&self, passenger: &PassengerDetails) -> i64 {
        if passenger.has_luggage && passenger.luggage_count > self.max_free_bags {
            self.luggage_fee
        } else {
            0
        }
    }

    /// Prices a booking from the trip as it is right now. The result is
    /// stored on the booking and never recomputed.
    pub fn quote(&self, trip: &Trip, passenger: &PassengerDetails) -> FareBreakdown {
        FareBreakdown {
            ticket_amount: trip.price,
            insurance_amount: self.insurance_fee,
            luggage_amount: self.luggage_fee_for(passenger),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busconnect_core::trip::TripStatus;
    use busconnect_shared::pii::Masked;
    use uuid::Uuid;

    fn trip(price: i64) -> Trip {
        Trip {
            id: Uuid::new_v4(),
            origin: "KNUST".to_string(),
            destination: "Accra".to_string(),
            organizer_id: "org-9".to_string(),
            departure_date: chrono::NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
            price,
            total_seats: 40,
            available_seats: 40,
            status: TripStatus::Approved,
            created_at: chrono::Utc::now(),
        }
    }

    fn passenger(has_luggage: bool, luggage_count: u32) -> PassengerDetails {
        PassengerDetails {
            full_name: "Esi Owusu".to_string(),
            student_id: "20551234".to_string(),
            student_class: "Level 100".to_string(),
            phone: Masked("0244000111".to_string()),
            emergency_contact: Masked("0244000222".to_string()),
            has_luggage,
            luggage_count,
        }
    }

    #[test]
    fn test_insurance_always_applies() {
        let fares = FareSchedule::default();
        let quote = fares.quote(&trip(12000), &passenger(false, 0));
        assert_eq!(quote.total(), 15000);
        assert_eq!(quote.luggage_amount, 0);
    }

    #[test]
    fn test_luggage_fee_only_above_free_allowance() {
        let fares = FareSchedule::default();
        assert_eq!(fares.quote(&trip(12000), &passenger(true, 3)).luggage_amount, 0);
        assert_eq!(fares.quote(&trip(12000), &passenger(true, 4)).luggage_amount, 500);
        assert_eq!(fares.quote(&trip(12000), &passenger(true, 4)).total(), 15500);
    }
}
