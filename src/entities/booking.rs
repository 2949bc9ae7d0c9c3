use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Ride;
use crate::error::{conflict_error, integrity_error, Error};
use crate::otp::Otp;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub status: Status,
    pub ride_id: Uuid,
    pub passenger_id: Uuid,
    pub seats: i32,
    pub source: String,
    pub destination: String,
    pub distance_km: f64,
    /// Total fare across all booked seats, not the per-seat figure.
    pub fare: f64,
    pub currency: String,
    pub payment: Option<PaymentRef>,
    pub otp: Option<Otp>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentRef {
    pub payment_id: String,
    pub order_ref: String,
}

/// The confirmed sub-workflow is a tagged stage rather than a pair of
/// booleans, so a passenger confirmation can never exist without the driver
/// confirmation that precedes it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Status {
    Pending,
    Confirmed {
        stage: ConfirmationStage,
    },
    Completed {
        driver_confirmed_at: DateTime<Utc>,
        passenger_confirmed_at: DateTime<Utc>,
    },
    Cancelled,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ConfirmationStage {
    AwaitingCompletion,
    DriverConfirmed {
        at: DateTime<Utc>,
    },
    OtpIssued {
        driver_confirmed_at: DateTime<Utc>,
        issued_at: DateTime<Utc>,
    },
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Pending => "pending".into(),
            Self::Confirmed { stage: _ } => "confirmed".into(),
            Self::Completed { .. } => "completed".into(),
            Self::Cancelled => "cancelled".into(),
        }
    }
}

impl Booking {
    pub fn new(
        ride: &Ride,
        passenger_id: Uuid,
        seats: i32,
        source: String,
        destination: String,
        distance_km: f64,
        fare: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: Status::Pending,
            ride_id: ride.id,
            passenger_id,
            seats,
            source,
            destination,
            distance_km,
            fare,
            currency: ride.currency.clone(),
            payment: None,
            otp: None,
        }
    }

    /// A booking that still counts against the one-active-booking-per-ride
    /// rule and is swept up by ride cancellation.
    pub fn is_active(&self) -> bool {
        matches!(self.status, Status::Pending | Status::Confirmed { .. })
    }

    pub fn attach_payment(&mut self, payment: PaymentRef) {
        self.payment = Some(payment);
    }

    /// PENDING -> CONFIRMED, only once payment has been verified upstream.
    #[tracing::instrument]
    pub fn confirm(&mut self) -> Result<(), Error> {
        if self.payment.is_none() {
            return Err(integrity_error("booking confirmed without payment"));
        }

        match self.status {
            Status::Pending => {
                self.status = Status::Confirmed {
                    stage: ConfirmationStage::AwaitingCompletion,
                };
                Ok(())
            }
            _ => Err(conflict_error("booking is not pending")),
        }
    }

    /// Reachable from PENDING, or from CONFIRMED via the ride-cancellation
    /// cascade before the ride has run.
    #[tracing::instrument]
    pub fn cancel(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Pending
            | Status::Confirmed {
                stage: ConfirmationStage::AwaitingCompletion,
            } => {
                self.status = Status::Cancelled;
                Ok(())
            }
            _ => Err(conflict_error("booking cannot be cancelled")),
        }
    }

    /// Records the driver's side of completion when the ride is marked done.
    #[tracing::instrument]
    pub fn driver_confirm(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        if self.payment.is_none() {
            return Err(integrity_error("confirmed booking has no payment"));
        }

        match self.status {
            Status::Confirmed {
                stage: ConfirmationStage::AwaitingCompletion,
            } => {
                self.status = Status::Confirmed {
                    stage: ConfirmationStage::DriverConfirmed { at: now },
                };
                Ok(())
            }
            _ => Err(conflict_error("booking is not awaiting completion")),
        }
    }

    /// Attaches a freshly issued code, or re-stamps the issue time when an
    /// unexpired code is re-sent. Requires the driver confirmation stage.
    #[tracing::instrument(skip(otp))]
    pub fn issue_otp(&mut self, otp: Otp, now: DateTime<Utc>) -> Result<(), Error> {
        let driver_confirmed_at = match self.status {
            Status::Confirmed {
                stage: ConfirmationStage::DriverConfirmed { at },
            } => at,
            Status::Confirmed {
                stage:
                    ConfirmationStage::OtpIssued {
                        driver_confirmed_at,
                        issued_at: _,
                    },
            } => driver_confirmed_at,
            _ => return Err(conflict_error("booking is not awaiting an OTP")),
        };

        self.otp = Some(otp);
        self.status = Status::Confirmed {
            stage: ConfirmationStage::OtpIssued {
                driver_confirmed_at,
                issued_at: now,
            },
        };

        Ok(())
    }

    /// CONFIRMED (OTP issued) -> COMPLETED. The stored code is not cleared;
    /// eligibility is gated on status, so a consumed code cannot be replayed.
    #[tracing::instrument]
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        match self.status {
            Status::Confirmed {
                stage:
                    ConfirmationStage::OtpIssued {
                        driver_confirmed_at,
                        issued_at: _,
                    },
            } => {
                self.status = Status::Completed {
                    driver_confirmed_at,
                    passenger_confirmed_at: now,
                };
                Ok(())
            }
            _ => Err(conflict_error("booking has no outstanding OTP")),
        }
    }

    /// Passenger-facing view: the OTP never leaves the server.
    pub fn public(mut self) -> Self {
        self.otp = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp;
    use chrono::Duration;

    fn confirmed_booking() -> Booking {
        let ride = Ride::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Chennai".into(),
            "Bangalore".into(),
            Utc::now() + Duration::hours(1),
            3,
            1016.67,
            300.0,
            18000.0,
            "INR".into(),
            None,
        );

        let mut booking = Booking::new(
            &ride,
            Uuid::new_v4(),
            2,
            "Vellore".into(),
            "Bangalore".into(),
            160.0,
            1120.0,
        );
        booking.attach_payment(PaymentRef {
            payment_id: "pay_1".into(),
            order_ref: "order_1".into(),
        });
        booking.confirm().unwrap();

        booking
    }

    #[test]
    fn confirmation_requires_a_payment_reference() {
        let ride = Ride::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "A".into(),
            "B".into(),
            Utc::now() + Duration::hours(1),
            2,
            100.0,
            10.0,
            600.0,
            "INR".into(),
            None,
        );
        let mut booking = Booking::new(&ride, Uuid::new_v4(), 1, "A".into(), "B".into(), 10.0, 100.0);

        assert!(booking.confirm().is_err());
        assert!(matches!(booking.status, Status::Pending));
    }

    #[test]
    fn completion_walks_the_nested_stages_in_order() {
        let mut booking = confirmed_booking();
        let now = Utc::now();

        // OTP cannot be issued before the driver confirms
        assert!(booking
            .issue_otp(otp::generate(Duration::minutes(10)), now)
            .is_err());

        booking.driver_confirm(now).unwrap();
        booking
            .issue_otp(otp::generate(Duration::minutes(10)), now)
            .unwrap();
        booking.complete(now).unwrap();

        match booking.status {
            Status::Completed {
                driver_confirmed_at,
                passenger_confirmed_at,
            } => {
                assert_eq!(driver_confirmed_at, now);
                assert_eq!(passenger_confirmed_at, now);
            }
            _ => panic!("expected completed booking"),
        }
    }

    #[test]
    fn consumed_otp_cannot_be_replayed() {
        let mut booking = confirmed_booking();
        let now = Utc::now();

        booking.driver_confirm(now).unwrap();
        booking
            .issue_otp(otp::generate(Duration::minutes(10)), now)
            .unwrap();
        booking.complete(now).unwrap();

        // the code is still stored but the status gate rejects a second pass
        assert!(booking.otp.is_some());
        assert!(booking.complete(now).is_err());
    }

    #[test]
    fn cancellation_windows() {
        let mut pending = confirmed_booking();
        pending.cancel().unwrap();
        assert!(matches!(pending.status, Status::Cancelled));
        assert!(pending.cancel().is_err());

        let mut riding = confirmed_booking();
        riding.driver_confirm(Utc::now()).unwrap();
        assert!(riding.cancel().is_err());
    }

    #[test]
    fn public_view_scrubs_the_otp() {
        let mut booking = confirmed_booking();
        let now = Utc::now();

        booking.driver_confirm(now).unwrap();
        booking
            .issue_otp(otp::generate(Duration::minutes(10)), now)
            .unwrap();

        assert!(booking.clone().public().otp.is_none());
    }
}
