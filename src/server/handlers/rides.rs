use axum::extract::{Extension, Json, Path, Query};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{CreateRideParams, DynAPI, SearchQuery};
use crate::entities::Ride;
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct DriverAction {
    driver_id: Uuid,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    Json(params): Json<CreateRideParams>,
) -> Result<Json<Ride>, Error> {
    let ride = api.create_ride(params).await?;

    Ok(ride.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.find_ride(id).await?;

    Ok(ride.into())
}

pub async fn search(
    Extension(api): Extension<DynAPI>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Ride>>, Error> {
    let rides = api.search_rides(query).await?;

    Ok(rides.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
    Json(params): Json<DriverAction>,
) -> Result<Json<Ride>, Error> {
    let ride = api.cancel_ride(params.driver_id, id).await?;

    Ok(ride.into())
}

pub async fn complete(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
    Json(params): Json<DriverAction>,
) -> Result<Json<Ride>, Error> {
    let ride = api.complete_ride(params.driver_id, id).await?;

    Ok(ride.into())
}
