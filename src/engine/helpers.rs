use super::Database;

use sqlx::{types::Json, Executor, Row, Transaction};
use uuid::Uuid;

use crate::{
    entities::{Booking, Ride},
    error::{not_found_error, Error},
};

#[tracing::instrument(skip(tx))]
pub async fn fetch_ride_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Ride, Error> {
    let Json(ride): Json<Ride> = tx
        .fetch_optional(sqlx::query("SELECT data FROM rides WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(not_found_error)?
        .try_get("data")?;

    Ok(ride)
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_booking_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Booking, Error> {
    let Json(booking): Json<Booking> = tx
        .fetch_optional(sqlx::query("SELECT data FROM bookings WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(not_found_error)?
        .try_get("data")?;

    Ok(booking)
}

/// Non-locking read used for ownership checks inside a transaction.
#[tracing::instrument(skip(tx))]
pub async fn fetch_ride(tx: &mut Transaction<'_, Database>, id: &Uuid) -> Result<Ride, Error> {
    let Json(ride): Json<Ride> = tx
        .fetch_optional(sqlx::query("SELECT data FROM rides WHERE id = $1").bind(id))
        .await?
        .ok_or_else(not_found_error)?
        .try_get("data")?;

    Ok(ride)
}

#[tracing::instrument(skip(tx, ride))]
pub async fn update_ride(tx: &mut Transaction<'_, Database>, ride: &Ride) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE rides SET status = $2, data = $3 WHERE id = $1")
            .bind(&ride.id)
            .bind(ride.status.name())
            .bind(Json(ride)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, booking))]
pub async fn update_booking(
    tx: &mut Transaction<'_, Database>,
    booking: &Booking,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE bookings SET status = $2, data = $3 WHERE id = $1")
            .bind(&booking.id)
            .bind(booking.status.name())
            .bind(Json(booking)),
    )
    .await?;

    Ok(())
}
