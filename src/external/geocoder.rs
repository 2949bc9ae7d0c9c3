use async_trait::async_trait;
use serde::Deserialize;
use std::env;

use crate::entities::{Coordinates, RouteGeometry};
use crate::error::{upstream_error, validation_error, Error};
use crate::external::http_client;

/// What the routing backend knows about a source/destination pair.
#[derive(Clone, Debug)]
pub struct RouteSummary {
    pub distance_km: f64,
    pub duration_sec: f64,
    /// Ordered driving path, when the backend can supply one.
    pub polyline: Option<RouteGeometry>,
}

/// Resolves free-text place names and routes between coordinate pairs.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, text: &str) -> Result<Coordinates, Error>;
    async fn route_between(
        &self,
        source: Coordinates,
        destination: Coordinates,
    ) -> Result<RouteSummary, Error>;
}

/// Nominatim-style forward geocoding plus OSRM-style routing.
#[derive(Debug)]
pub struct HttpGeocoder {
    client: reqwest::Client,
}

impl HttpGeocoder {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            client: http_client()?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    /// metres
    distance: f64,
    /// seconds
    duration: f64,
    geometry: Option<OsrmGeometry>,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    #[tracing::instrument(skip(self))]
    async fn geocode(&self, text: &str) -> Result<Coordinates, Error> {
        let api_base = env::var("GEOCODER_API_BASE")?;
        let url = format!("https://{}/search", api_base);

        let res = self
            .client
            .get(url)
            .query(&[("q", text)])
            .query(&[("format", "json")])
            .query(&[("limit", "1")])
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if (400..500).contains(&status_code) {
            return Err(validation_error("unresolvable place name"));
        } else if status_code != 200 {
            return Err(upstream_error());
        }

        let results: Vec<GeocodeResult> = res.json().await?;
        let first = results
            .first()
            .ok_or_else(|| validation_error("unresolvable place name"))?;

        let point = Coordinates::new(
            first.lon.parse().map_err(|_| upstream_error())?,
            first.lat.parse().map_err(|_| upstream_error())?,
        );

        if !point.is_plausible() {
            return Err(upstream_error());
        }

        Ok(point)
    }

    #[tracing::instrument(skip(self))]
    async fn route_between(
        &self,
        source: Coordinates,
        destination: Coordinates,
    ) -> Result<RouteSummary, Error> {
        let api_base = env::var("ROUTER_API_BASE")?;
        let url = format!(
            "https://{}/route/v1/driving/{},{};{},{}",
            api_base,
            source.longitude,
            source.latitude,
            destination.longitude,
            destination.latitude,
        );

        let res = self
            .client
            .get(url)
            .query(&[("overview", "full")])
            .query(&[("geometries", "geojson")])
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if (400..500).contains(&status_code) {
            return Err(validation_error("unroutable coordinate pair"));
        } else if status_code != 200 {
            return Err(upstream_error());
        }

        let data: OsrmResponse = res.json().await?;

        if data.code != "Ok" {
            return Err(upstream_error());
        }

        let route = data.routes.into_iter().next().ok_or_else(upstream_error)?;

        let polyline = route
            .geometry
            .map(|geometry| {
                RouteGeometry(
                    geometry
                        .coordinates
                        .into_iter()
                        .map(Coordinates::from)
                        .collect(),
                )
            })
            .filter(RouteGeometry::is_usable);

        Ok(RouteSummary {
            distance_km: route.distance / 1000.0,
            duration_sec: route.duration,
            polyline,
        })
    }
}
