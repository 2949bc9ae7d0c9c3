use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Coordinates, RouteGeometry};
use crate::error::{conflict_error, validation_error, Error};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub status: Status,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub source: String,
    pub destination: String,
    pub departure: DateTime<Utc>,
    pub total_seats: i32,
    pub available_seats: i32,
    pub fare_per_seat: f64,
    pub distance_km: f64,
    pub duration_sec: f64,
    pub currency: String,
    pub source_coordinates: Option<Coordinates>,
    pub destination_coordinates: Option<Coordinates>,
    pub geometry: Option<RouteGeometry>,
    pub notes: Option<String>,
    // display fields cached from the identity store, backfilled on search
    pub driver_name: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_type: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Status {
    Posted,
    Booked,
    Cancelled,
    Completed,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Posted => "posted".into(),
            Self::Booked => "booked".into(),
            Self::Cancelled => "cancelled".into(),
            Self::Completed => "completed".into(),
        }
    }
}

impl Ride {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        driver_id: Uuid,
        vehicle_id: Uuid,
        source: String,
        destination: String,
        departure: DateTime<Utc>,
        total_seats: i32,
        fare_per_seat: f64,
        distance_km: f64,
        duration_sec: f64,
        currency: String,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: Status::Posted,
            driver_id,
            vehicle_id,
            source,
            destination,
            departure,
            total_seats,
            available_seats: total_seats,
            fare_per_seat,
            distance_km,
            duration_sec,
            currency,
            source_coordinates: None,
            destination_coordinates: None,
            geometry: None,
            notes,
            driver_name: None,
            vehicle_model: None,
            vehicle_type: None,
        }
    }

    /// A ride still accepting bookings: POSTED or BOOKED, seats notwithstanding.
    pub fn is_active(&self) -> bool {
        matches!(self.status, Status::Posted | Status::Booked)
    }

    pub fn has_departed(&self, now: DateTime<Utc>) -> bool {
        now >= self.departure
    }

    /// Commits `seats` confirmed seats. Only called once the payment behind
    /// them has been verified; the first confirmation advances POSTED to
    /// BOOKED.
    #[tracing::instrument]
    pub fn confirm_seats(&mut self, seats: i32) -> Result<(), Error> {
        if !self.is_active() {
            return Err(conflict_error("ride is no longer active"));
        }

        if seats < 1 {
            return Err(validation_error("seat count must be positive"));
        }

        if seats > self.available_seats {
            return Err(conflict_error("not enough seats available"));
        }

        self.available_seats -= seats;

        if let Status::Posted = self.status {
            self.status = Status::Booked;
        }

        Ok(())
    }

    #[tracing::instrument]
    pub fn cancel(&mut self) -> Result<(), Error> {
        if !self.is_active() {
            return Err(conflict_error("ride cannot be cancelled"));
        }

        self.status = Status::Cancelled;
        Ok(())
    }

    /// Marks the ride done. Rejected until the scheduled departure has passed.
    #[tracing::instrument]
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        if !self.is_active() {
            return Err(conflict_error("ride cannot be completed"));
        }

        if !self.has_departed(now) {
            return Err(validation_error("ride has not yet departed"));
        }

        self.status = Status::Completed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ride() -> Ride {
        Ride::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Chennai".into(),
            "Bangalore".into(),
            Utc::now() + Duration::hours(6),
            3,
            1016.67,
            300.0,
            18000.0,
            "INR".into(),
            None,
        )
    }

    #[test]
    fn new_ride_is_posted_with_all_seats_free() {
        let ride = ride();

        assert!(matches!(ride.status, Status::Posted));
        assert_eq!(ride.available_seats, ride.total_seats);
    }

    #[test]
    fn first_confirmation_advances_posted_to_booked() {
        let mut ride = ride();

        ride.confirm_seats(1).unwrap();

        assert!(matches!(ride.status, Status::Booked));
        assert_eq!(ride.available_seats, 2);
    }

    #[test]
    fn confirmation_never_drives_seats_negative() {
        let mut ride = ride();

        ride.confirm_seats(2).unwrap();
        assert!(ride.confirm_seats(2).is_err());
        assert_eq!(ride.available_seats, 1);
    }

    #[test]
    fn cancelled_ride_rejects_further_mutation() {
        let mut ride = ride();

        ride.cancel().unwrap();

        assert!(ride.confirm_seats(1).is_err());
        assert!(ride.cancel().is_err());
        assert!(ride.complete(Utc::now() + Duration::days(1)).is_err());
    }

    #[test]
    fn completion_requires_departure_to_have_passed() {
        let mut ride = ride();

        assert!(ride.complete(Utc::now()).is_err());
        assert!(matches!(ride.status, Status::Posted));

        ride.complete(Utc::now() + Duration::days(1)).unwrap();
        assert!(matches!(ride.status, Status::Completed));
    }
}
