use std::env;

/// Linear fare model: a flat base charge plus a per-kilometre rate.
#[derive(Clone, Debug)]
pub struct FareSchedule {
    pub base_fare: f64,
    pub rate_per_km: f64,
    pub currency: String,
}

impl Default for FareSchedule {
    fn default() -> Self {
        Self {
            base_fare: 50.0,
            rate_per_km: 10.0,
            currency: "INR".into(),
        }
    }
}

impl FareSchedule {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            base_fare: env_f64("FARE_BASE", defaults.base_fare),
            rate_per_km: env_f64("FARE_RATE_PER_KM", defaults.rate_per_km),
            currency: env::var("FARE_CURRENCY").unwrap_or(defaults.currency),
        }
    }

    /// Per-seat fare for a journey of the given length, rounded at the point
    /// of computation.
    pub fn fare(&self, distance_km: f64) -> f64 {
        round2(self.base_fare + self.rate_per_km * distance_km)
    }

    /// Total fare for a booking: per-seat fare times seats, rounded again so
    /// the stored figure is exact to two decimal places.
    pub fn total(&self, per_seat_fare: f64, seats: i32) -> f64 {
        round2(per_seat_fare * f64::from(seats))
    }
}

/// Monetary rounding to 2 decimal places. Applied when a value is computed,
/// never deferred to display time.
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> FareSchedule {
        FareSchedule {
            base_fare: 50.0,
            rate_per_km: 10.0,
            currency: "INR".into(),
        }
    }

    #[test]
    fn fare_is_base_plus_rate_times_distance() {
        assert_eq!(schedule().fare(12.345), 173.45);
    }

    #[test]
    fn total_is_per_seat_times_seats_rounded() {
        let schedule = schedule();
        let per_seat = schedule.fare(12.345);

        assert_eq!(schedule.total(per_seat, 3), 520.35);
        assert_eq!(schedule.total(per_seat, 1), per_seat);
    }

    #[test]
    fn zero_distance_still_charges_base_fare() {
        assert_eq!(schedule().fare(0.0), 50.0);
    }

    #[test]
    fn round2_keeps_two_decimal_places() {
        assert_eq!(round2(173.4551), 173.46);
        assert_eq!(round2(173.4549), 173.45);
    }
}
