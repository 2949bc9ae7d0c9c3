use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{Booking, Ride};
use crate::error::Error;
use crate::external::payments::{PaymentCallback, PaymentOrder};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateRideParams {
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub source: String,
    pub destination: String,
    pub departure: DateTime<Utc>,
    pub total_seats: i32,
    pub notes: Option<String>,
}

/// Search parameters as they arrive on the query string; coordinates are
/// optional and, when absent, resolved once by geocoding the place texts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchQuery {
    pub date: NaiveDate,
    pub source: String,
    pub destination: String,
    pub source_longitude: Option<f64>,
    pub source_latitude: Option<f64>,
    pub destination_longitude: Option<f64>,
    pub destination_latitude: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub vehicle_type: Option<String>,
    pub min_rating: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateBookingParams {
    pub passenger_id: Uuid,
    pub ride_id: Uuid,
    pub seats: i32,
    /// Passenger boarding point; defaults to the ride's source.
    pub source: Option<String>,
    /// Passenger drop-off point; defaults to the ride's destination.
    pub destination: Option<String>,
}

/// A freshly reserved booking together with the payment order the client
/// must settle before the seat is confirmed.
#[derive(Clone, Debug, Serialize)]
pub struct BookingReceipt {
    pub booking: Booking,
    pub order: PaymentOrder,
}

#[async_trait]
pub trait RideAPI {
    async fn create_ride(&self, params: CreateRideParams) -> Result<Ride, Error>;
    async fn find_ride(&self, id: Uuid) -> Result<Ride, Error>;
    async fn search_rides(&self, query: SearchQuery) -> Result<Vec<Ride>, Error>;
    async fn cancel_ride(&self, driver_id: Uuid, id: Uuid) -> Result<Ride, Error>;
    async fn complete_ride(&self, driver_id: Uuid, id: Uuid) -> Result<Ride, Error>;
}

#[async_trait]
pub trait BookingAPI {
    async fn create_booking(&self, params: CreateBookingParams) -> Result<BookingReceipt, Error>;
    async fn find_booking(&self, id: Uuid) -> Result<Booking, Error>;
    async fn confirm_booking(&self, id: Uuid, callback: PaymentCallback) -> Result<Booking, Error>;
    async fn cancel_booking(&self, passenger_id: Uuid, id: Uuid) -> Result<Booking, Error>;
    async fn request_otp(&self, driver_id: Uuid, id: Uuid) -> Result<Booking, Error>;
    async fn complete_booking(
        &self,
        driver_id: Uuid,
        id: Uuid,
        code: String,
    ) -> Result<Booking, Error>;
}

pub trait API: RideAPI + BookingAPI {}

pub type DynAPI = Arc<dyn API + Send + Sync>;
