use super::helpers::{fetch_ride_for_update, update_booking, update_ride};
use super::Engine;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use futures::TryStreamExt;
use serde_json::json;
use sqlx::{types::Json, Acquire, Executor, Row};
use uuid::Uuid;

use crate::{
    api::{CreateRideParams, RideAPI, SearchQuery},
    entities::{Booking, Coordinates, Ride, RouteGeometry},
    error::{not_found_error, validation_error, Error},
    geometry::{matches_route, DriverRoute, SearchPoints},
};

const SYNTHETIC_WAYPOINTS: usize = 8;

#[async_trait]
impl RideAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn create_ride(&self, params: CreateRideParams) -> Result<Ride, Error> {
        if params.total_seats < 1 {
            return Err(validation_error("ride must offer at least one seat"));
        }

        if params.departure <= Utc::now() {
            return Err(validation_error("departure must be in the future"));
        }

        let vehicles = self.identity.vehicles_for_driver(params.driver_id).await?;
        let vehicle = vehicles
            .into_iter()
            .find(|vehicle| vehicle.id == params.vehicle_id)
            .ok_or_else(|| validation_error("vehicle does not belong to driver"))?;

        // a ride cannot be posted without a distance, so geocoding failure
        // fails the post outright
        let source = self.geocoder.geocode(&params.source).await?;
        let destination = self.geocoder.geocode(&params.destination).await?;
        let summary = self.geocoder.route_between(source, destination).await?;

        let fare_per_seat = self.fare_schedule.fare(summary.distance_km);

        let mut ride = Ride::new(
            params.driver_id,
            params.vehicle_id,
            params.source,
            params.destination,
            params.departure,
            params.total_seats,
            fare_per_seat,
            summary.distance_km,
            summary.duration_sec,
            self.fare_schedule.currency.clone(),
            params.notes,
        );

        ride.source_coordinates = Some(source);
        ride.destination_coordinates = Some(destination);
        ride.geometry = summary
            .polyline
            .or_else(|| Some(RouteGeometry::synthesize(source, destination, SYNTHETIC_WAYPOINTS)));

        // display fields are a cache; a cold cache is not a posting failure
        match self.identity.user_public(params.driver_id).await {
            Ok(user) => ride.driver_name = Some(user.name),
            Err(err) => tracing::warn!(?err, "could not cache driver display name"),
        }
        ride.vehicle_model = Some(vehicle.model);
        ride.vehicle_type = Some(vehicle.vehicle_type);

        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query("INSERT INTO rides (id, status, departure, data) VALUES ($1, $2, $3, $4)")
                .bind(&ride.id)
                .bind(ride.status.name())
                .bind(&ride.departure)
                .bind(Json(&ride)),
        )
        .await?;

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, id: Uuid) -> Result<Ride, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM rides WHERE id = $1").bind(&id))
            .await?;

        let result = maybe_result.ok_or_else(not_found_error)?;
        let Json(ride) = result.try_get("data")?;

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn search_rides(&self, query: SearchQuery) -> Result<Vec<Ride>, Error> {
        let day_start = Utc.from_utc_datetime(&NaiveDateTime::new(query.date, NaiveTime::MIN));
        let day_end = day_start + Duration::days(1);
        let now = Utc::now();

        // resolve passenger coordinates once, up front; geocoding failure
        // degrades the search to text matching instead of aborting it
        let source_coordinates = match (query.source_longitude, query.source_latitude) {
            (Some(longitude), Some(latitude)) => Some(Coordinates::new(longitude, latitude)),
            _ => self.geocoder.geocode(&query.source).await.ok(),
        };
        let destination_coordinates =
            match (query.destination_longitude, query.destination_latitude) {
                (Some(longitude), Some(latitude)) => Some(Coordinates::new(longitude, latitude)),
                _ => self.geocoder.geocode(&query.destination).await.ok(),
            };

        let search = SearchPoints {
            source_text: &query.source,
            destination_text: &query.destination,
            source: source_coordinates,
            destination: destination_coordinates,
        };

        let mut conn = self.pool.acquire().await?;

        let mut candidates = Vec::new();

        {
            let mut results = conn.fetch(
                sqlx::query(
                    "SELECT data FROM rides WHERE status IN ('posted', 'booked') AND (data->>'available_seats')::int > 0 AND departure >= $1 AND departure < $2",
                )
                .bind(&day_start)
                .bind(&day_end),
            );

            while let Some(row) = results.try_next().await? {
                let Json(ride): Json<Ride> = row.try_get("data")?;

                if ride.has_departed(now) {
                    continue;
                }

                let route = DriverRoute {
                    source_text: &ride.source,
                    destination_text: &ride.destination,
                    source: ride.source_coordinates,
                    destination: ride.destination_coordinates,
                    geometry: ride.geometry.as_ref(),
                };

                let matched = matches_route(&search, &route, &self.match_config);

                if matched {
                    candidates.push(ride);
                }
            }
        }

        let mut matches = Vec::new();

        for mut ride in candidates {
            self.backfill_display_fields(&mut ride).await;

            if let Some(min_price) = query.min_price {
                if ride.fare_per_seat < min_price {
                    continue;
                }
            }

            if let Some(max_price) = query.max_price {
                if ride.fare_per_seat > max_price {
                    continue;
                }
            }

            if let Some(wanted) = &query.vehicle_type {
                // rides whose vehicle type is still unknown are kept
                if let Some(actual) = &ride.vehicle_type {
                    if !actual.to_lowercase().contains(&wanted.to_lowercase()) {
                        continue;
                    }
                }
            }

            if let Some(floor) = query.min_rating {
                match self.identity.driver_rating(ride.driver_id).await {
                    Ok(Some(rating)) if rating < floor => continue,
                    Ok(_) => {}
                    // rides lacking rating data are not excluded
                    Err(err) => tracing::warn!(?err, "driver rating lookup failed"),
                }
            }

            matches.push(ride);
        }

        Ok(matches)
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_ride(&self, driver_id: Uuid, id: Uuid) -> Result<Ride, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut ride = fetch_ride_for_update(&mut tx, &id).await?;

        if ride.driver_id != driver_id {
            return Err(validation_error("only the ride's driver may cancel it"));
        }

        ride.cancel()?;
        update_ride(&mut tx, &ride).await?;

        // cascade to every booking still active on this ride
        let rows = tx
            .fetch_all(
                sqlx::query("SELECT data FROM bookings WHERE ride_id = $1 FOR UPDATE").bind(&id),
            )
            .await?;

        let mut cancelled = Vec::new();

        for row in rows {
            let Json(mut booking): Json<Booking> = row.try_get("data")?;

            if !booking.is_active() {
                continue;
            }

            booking.cancel()?;
            update_booking(&mut tx, &booking).await?;
            cancelled.push(booking);
        }

        tx.commit().await?;

        for booking in &cancelled {
            self.notify_booking_cancelled(&ride, booking).await;
        }

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn complete_ride(&self, driver_id: Uuid, id: Uuid) -> Result<Ride, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut ride = fetch_ride_for_update(&mut tx, &id).await?;

        if ride.driver_id != driver_id {
            return Err(validation_error("only the ride's driver may complete it"));
        }

        let now = Utc::now();

        ride.complete(now)?;
        update_ride(&mut tx, &ride).await?;

        // record the driver's side of completion on every paid booking
        let rows = tx
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM bookings WHERE ride_id = $1 AND status = 'confirmed' FOR UPDATE",
                )
                .bind(&id),
            )
            .await?;

        for row in rows {
            let Json(mut booking): Json<Booking> = row.try_get("data")?;

            if booking.payment.is_none() {
                tracing::error!(booking_id = %booking.id, "confirmed booking without payment reference");
                continue;
            }

            booking.driver_confirm(now)?;
            update_booking(&mut tx, &booking).await?;
        }

        tx.commit().await?;

        Ok(ride)
    }
}

impl Engine {
    /// Cache-aside backfill of denormalized display fields. The persist is
    /// best effort: search results carry the fetched values either way.
    #[tracing::instrument(skip(self, ride))]
    pub(super) async fn backfill_display_fields(&self, ride: &mut Ride) {
        if ride.driver_name.is_some() && ride.vehicle_model.is_some() && ride.vehicle_type.is_some()
        {
            return;
        }

        if ride.driver_name.is_none() {
            match self.identity.user_public(ride.driver_id).await {
                Ok(user) => ride.driver_name = Some(user.name),
                Err(err) => tracing::warn!(?err, "driver display lookup failed"),
            }
        }

        if ride.vehicle_model.is_none() || ride.vehicle_type.is_none() {
            match self.identity.vehicles_for_driver(ride.driver_id).await {
                Ok(vehicles) => {
                    if let Some(vehicle) =
                        vehicles.into_iter().find(|vehicle| vehicle.id == ride.vehicle_id)
                    {
                        ride.vehicle_model = Some(vehicle.model);
                        ride.vehicle_type = Some(vehicle.vehicle_type);
                    }
                }
                Err(err) => tracing::warn!(?err, "vehicle display lookup failed"),
            }
        }

        // merge only the display keys: the search snapshot this ride came
        // from holds no lock, and seat or status state committed since must
        // never be written back
        let persist = async {
            let mut conn = self.pool.acquire().await?;
            conn.execute(
                sqlx::query(
                    "UPDATE rides SET data = data || jsonb_build_object('driver_name', $2::text, 'vehicle_model', $3::text, 'vehicle_type', $4::text) WHERE id = $1",
                )
                .bind(&ride.id)
                .bind(&ride.driver_name)
                .bind(&ride.vehicle_model)
                .bind(&ride.vehicle_type),
            )
            .await?;
            Ok::<(), Error>(())
        };

        if let Err(err) = persist.await {
            tracing::warn!(?err, "failed to persist display field backfill");
        }
    }

    pub(super) async fn notify_booking_cancelled(&self, ride: &Ride, booking: &Booking) {
        let payload = json!({
            "event": "booking_cancelled",
            "ride_id": ride.id,
            "booking_id": booking.id,
        });

        if let Err(err) = self
            .notifier
            .push(&format!("passengers:{}", booking.passenger_id), payload)
            .await
        {
            tracing::warn!(?err, "cancellation push failed");
        }
    }
}
