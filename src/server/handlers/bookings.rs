use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{BookingReceipt, CreateBookingParams, DynAPI};
use crate::entities::Booking;
use crate::error::Error;
use crate::external::payments::PaymentCallback;

#[derive(Serialize, Deserialize)]
pub struct PassengerAction {
    passenger_id: Uuid,
}

#[derive(Serialize, Deserialize)]
pub struct DriverAction {
    driver_id: Uuid,
}

#[derive(Serialize, Deserialize)]
pub struct CompleteParams {
    driver_id: Uuid,
    code: String,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    Json(params): Json<CreateBookingParams>,
) -> Result<Json<BookingReceipt>, Error> {
    let receipt = api.create_booking(params).await?;

    Ok(receipt.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, Error> {
    let booking = api.find_booking(id).await?;

    Ok(booking.into())
}

pub async fn confirm_payment(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
    Json(callback): Json<PaymentCallback>,
) -> Result<Json<Booking>, Error> {
    let booking = api.confirm_booking(id, callback).await?;

    Ok(booking.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
    Json(params): Json<PassengerAction>,
) -> Result<Json<Booking>, Error> {
    let booking = api.cancel_booking(params.passenger_id, id).await?;

    Ok(booking.into())
}

pub async fn request_otp(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
    Json(params): Json<DriverAction>,
) -> Result<Json<Booking>, Error> {
    let booking = api.request_otp(params.driver_id, id).await?;

    Ok(booking.into())
}

pub async fn complete(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
    Json(params): Json<CompleteParams>,
) -> Result<Json<Booking>, Error> {
    let booking = api.complete_booking(params.driver_id, id, params.code).await?;

    Ok(booking.into())
}
