use super::helpers::{
    fetch_booking_for_update, fetch_ride, fetch_ride_for_update, update_booking, update_ride,
};
use super::{Database, Engine};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::{pool::PoolConnection, Acquire, Executor, Row};
use uuid::Uuid;

use crate::{
    api::{BookingAPI, BookingReceipt, CreateBookingParams, RideAPI},
    entities::{Booking, BookingStatus, ConfirmationStage, PaymentRef, Ride, RideStatus},
    error::{conflict_error, integrity_error, not_found_error, validation_error, Error},
    external::payments::PaymentCallback,
    geometry::text_match,
    otp,
};

#[async_trait]
impl BookingAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn create_booking(&self, params: CreateBookingParams) -> Result<BookingReceipt, Error> {
        if params.seats < 1 {
            return Err(validation_error("seat count must be positive"));
        }

        let ride = self.find_ride(params.ride_id).await?;
        let now = Utc::now();

        if !ride.is_active() {
            return Err(conflict_error("ride is no longer accepting bookings"));
        }

        if ride.has_departed(now) {
            return Err(conflict_error("ride has already departed"));
        }

        if ride.driver_id == params.passenger_id {
            return Err(validation_error("drivers cannot book their own ride"));
        }

        // weak seat check; the authoritative gate runs under the ride lock
        // at confirmation time
        if params.seats > ride.available_seats {
            return Err(conflict_error("not enough seats available"));
        }

        let mut conn = self.pool.acquire().await?;

        let existing = conn
            .fetch_optional(
                sqlx::query(
                    "SELECT id FROM bookings WHERE ride_id = $1 AND passenger_id = $2 AND status IN ('pending', 'confirmed')",
                )
                .bind(&ride.id)
                .bind(&params.passenger_id),
            )
            .await?;

        if existing.is_some() {
            return Err(conflict_error("an active booking for this ride already exists"));
        }

        let source = params
            .source
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| ride.source.clone());
        let destination = params
            .destination
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| ride.destination.clone());

        let (distance_km, per_seat_fare) =
            self.passenger_segment(&ride, &source, &destination).await?;
        let total_fare = self.fare_schedule.total(per_seat_fare, params.seats);

        let mut booking = Booking::new(
            &ride,
            params.passenger_id,
            params.seats,
            source,
            destination,
            distance_km,
            total_fare,
        );

        let inserted = conn
            .execute(
                sqlx::query(
                    "INSERT INTO bookings (id, ride_id, passenger_id, status, data) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(&booking.id)
                .bind(&booking.ride_id)
                .bind(&booking.passenger_id)
                .bind(booking.status.name())
                .bind(sqlx::types::Json(&booking)),
            )
            .await;

        // two racing reservations by the same passenger both pass the check
        // above; the partial unique index catches the loser here
        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                return Err(conflict_error("an active booking for this ride already exists"));
            }

            return Err(err.into());
        }

        // a booking must never exist without an associated payment attempt:
        // if the order cannot be opened, the reservation is rolled back
        let order = match self
            .payments
            .open_order(
                booking.id,
                booking.passenger_id,
                ride.driver_id,
                total_fare,
                &booking.currency,
            )
            .await
        {
            Ok(order) => order,
            Err(err) => {
                discard_reservation(&mut conn, &booking.id).await;
                return Err(err);
            }
        };

        booking.attach_payment(PaymentRef {
            payment_id: order.payment_id.clone(),
            order_ref: order.order_ref.clone(),
        });

        let attached = conn
            .execute(
                sqlx::query("UPDATE bookings SET data = $2 WHERE id = $1")
                    .bind(&booking.id)
                    .bind(sqlx::types::Json(&booking)),
            )
            .await;

        // the provider order exists either way; a reservation that cannot
        // record its payment reference is discarded rather than left behind
        if let Err(err) = attached {
            discard_reservation(&mut conn, &booking.id).await;
            return Err(err.into());
        }

        Ok(BookingReceipt {
            booking: booking.public(),
            order,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn find_booking(&self, id: Uuid) -> Result<Booking, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM bookings WHERE id = $1").bind(&id))
            .await?;

        let result = maybe_result.ok_or_else(not_found_error)?;
        let sqlx::types::Json::<Booking>(booking) = result.try_get("data")?;

        Ok(booking.public())
    }

    #[tracing::instrument(skip(self, callback))]
    async fn confirm_booking(
        &self,
        id: Uuid,
        callback: PaymentCallback,
    ) -> Result<Booking, Error> {
        // the client's "payment succeeded" claim is an untrusted hint;
        // nothing moves until the gateway confirms it server-side
        let verification = self.payments.verify_payment(&callback).await?;

        if !verification.verified {
            return Err(conflict_error("payment could not be verified"));
        }

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut booking = fetch_booking_for_update(&mut tx, &id).await?;

        let matches_booking = booking
            .payment
            .as_ref()
            .map(|payment| {
                payment.payment_id == verification.payment_id
                    || payment.order_ref == callback.order_ref
            })
            .unwrap_or(false);

        if !matches_booking {
            return Err(validation_error("payment does not belong to this booking"));
        }

        // seat decrement and booking confirmation commit or fail together,
        // under the ride row lock
        let mut ride = fetch_ride_for_update(&mut tx, &booking.ride_id).await?;

        ride.confirm_seats(booking.seats)?;
        booking.confirm()?;

        update_ride(&mut tx, &ride).await?;
        update_booking(&mut tx, &booking).await?;

        tx.commit().await?;

        self.notify_booking_confirmed(&ride, &booking).await;

        Ok(booking.public())
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_booking(&self, passenger_id: Uuid, id: Uuid) -> Result<Booking, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut booking = fetch_booking_for_update(&mut tx, &id).await?;

        if booking.passenger_id != passenger_id {
            return Err(validation_error("only the booking's passenger may cancel it"));
        }

        // passengers may only back out before payment confirms; afterwards
        // cancellation happens solely through the ride-cancellation cascade
        if !matches!(booking.status, BookingStatus::Pending) {
            return Err(conflict_error("only pending bookings can be cancelled"));
        }

        booking.cancel()?;
        update_booking(&mut tx, &booking).await?;

        tx.commit().await?;

        Ok(booking.public())
    }

    #[tracing::instrument(skip(self))]
    async fn request_otp(&self, driver_id: Uuid, id: Uuid) -> Result<Booking, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut booking = fetch_booking_for_update(&mut tx, &id).await?;
        let ride = fetch_ride(&mut tx, &booking.ride_id).await?;

        if ride.driver_id != driver_id {
            return Err(validation_error("only the ride's driver may request an OTP"));
        }

        if !matches!(ride.status, RideStatus::Completed) {
            return Err(conflict_error("ride has not been completed"));
        }

        if booking.payment.is_none() {
            return Err(integrity_error("booking has no payment reference"));
        }

        let now = Utc::now();

        // an unexpired code is re-sent, never regenerated
        let code = match (&booking.status, &booking.otp) {
            (
                BookingStatus::Confirmed {
                    stage: ConfirmationStage::OtpIssued { .. },
                },
                Some(existing),
            ) if !existing.is_expired(now) => existing.clone(),
            _ => otp::generate(self.otp_ttl),
        };

        booking.issue_otp(code.clone(), now)?;
        update_booking(&mut tx, &booking).await?;

        tx.commit().await?;

        // the code is already persisted; delivery failure is reported so the
        // driver can retry sending
        let passenger = self.identity.user_public(booking.passenger_id).await?;

        self.notifier
            .send_email(
                &passenger.email,
                "ride-completion-otp",
                json!({
                    "code": code.code,
                    "expires_at": code.expires_at,
                    "ride_source": ride.source,
                    "ride_destination": ride.destination,
                }),
            )
            .await?;

        Ok(booking.public())
    }

    #[tracing::instrument(skip(self, code))]
    async fn complete_booking(
        &self,
        driver_id: Uuid,
        id: Uuid,
        code: String,
    ) -> Result<Booking, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut booking = fetch_booking_for_update(&mut tx, &id).await?;
        let ride = fetch_ride(&mut tx, &booking.ride_id).await?;

        if ride.driver_id != driver_id {
            return Err(validation_error("only the ride's driver may complete a booking"));
        }

        // a consumed code cannot be replayed: the status gate fires before
        // the code is even compared
        if !matches!(
            booking.status,
            BookingStatus::Confirmed {
                stage: ConfirmationStage::OtpIssued { .. },
            }
        ) {
            return Err(conflict_error("booking has no outstanding OTP"));
        }

        let stored = booking
            .otp
            .clone()
            .ok_or_else(|| integrity_error("OTP stage reached without a stored code"))?;

        let now = Utc::now();

        if !otp::validate(&code, &stored, now) {
            return Err(validation_error("invalid or expired code"));
        }

        let payment = booking
            .payment
            .clone()
            .ok_or_else(|| integrity_error("completed booking has no payment reference"))?;

        booking.complete(now)?;
        update_booking(&mut tx, &booking).await?;

        tx.commit().await?;

        // the OTP is consumed at this point; a failed credit leaves a
        // completed booking with unreleased funds and demands reconciliation
        if let Err(err) = self.payments.credit_wallet(&payment.payment_id).await {
            tracing::error!(
                booking_id = %booking.id,
                payment_id = %payment.payment_id,
                ?err,
                "wallet credit failed after OTP consumption"
            );
            return Err(integrity_error("wallet credit failed; manual reconciliation required"));
        }

        let payload = json!({
            "event": "booking_completed",
            "ride_id": ride.id,
            "booking_id": booking.id,
        });

        if let Err(err) = self
            .notifier
            .push(&format!("passengers:{}", booking.passenger_id), payload)
            .await
        {
            tracing::warn!(?err, "completion push failed");
        }

        Ok(booking.public())
    }
}

impl Engine {
    /// Distance and per-seat fare for the passenger's sub-segment. When the
    /// segment is the ride's full route, the stored figures are reused so the
    /// geocoder is not re-invoked.
    #[tracing::instrument(skip(self, ride))]
    async fn passenger_segment(
        &self,
        ride: &Ride,
        source: &str,
        destination: &str,
    ) -> Result<(f64, f64), Error> {
        let full_route =
            text_match(source, &ride.source) && text_match(destination, &ride.destination);

        if full_route {
            return Ok((ride.distance_km, ride.fare_per_seat));
        }

        let source_point = self.geocoder.geocode(source).await?;
        let destination_point = self.geocoder.geocode(destination).await?;
        let summary = self
            .geocoder
            .route_between(source_point, destination_point)
            .await?;

        Ok((summary.distance_km, self.fare_schedule.fare(summary.distance_km)))
    }

    pub(super) async fn notify_booking_confirmed(&self, ride: &Ride, booking: &Booking) {
        let payload = json!({
            "event": "booking_confirmed",
            "ride_id": ride.id,
            "booking_id": booking.id,
            "seats": booking.seats,
        });

        if let Err(err) = self
            .notifier
            .push(&format!("drivers:{}", ride.driver_id), payload.clone())
            .await
        {
            tracing::warn!(?err, "driver confirmation push failed");
        }

        if let Err(err) = self
            .notifier
            .push(&format!("passengers:{}", booking.passenger_id), payload)
            .await
        {
            tracing::warn!(?err, "passenger confirmation push failed");
        }
    }
}

/// Removes a reservation whose payment attempt could not be recorded. A
/// failed delete is logged loudly: the orphan needs manual cleanup.
async fn discard_reservation(conn: &mut PoolConnection<Database>, booking_id: &Uuid) {
    let compensation = conn
        .execute(sqlx::query("DELETE FROM bookings WHERE id = $1").bind(booking_id))
        .await;

    if let Err(err) = compensation {
        tracing::error!(
            booking_id = %booking_id,
            ?err,
            "compensating delete failed; orphaned pending booking"
        );
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

