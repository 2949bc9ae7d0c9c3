use serde::{Deserialize, Serialize};

/// A point on the globe. Serializes as a GeoJSON-order `[longitude, latitude]`
/// pair, which is also the order stored route geometry uses on disk.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinates {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Rejects coordinates a geocoder should never legitimately return:
    /// non-finite values, out-of-range values, and the (0, 0) null island.
    pub fn is_plausible(&self) -> bool {
        if !self.longitude.is_finite() || !self.latitude.is_finite() {
            return false;
        }

        if self.longitude.abs() > 180.0 || self.latitude.abs() > 90.0 {
            return false;
        }

        self.longitude.abs() > 1e-6 || self.latitude.abs() > 1e-6
    }
}

impl From<[f64; 2]> for Coordinates {
    fn from(pair: [f64; 2]) -> Self {
        Self {
            longitude: pair[0],
            latitude: pair[1],
        }
    }
}

impl From<Coordinates> for [f64; 2] {
    fn from(coordinates: Coordinates) -> Self {
        [coordinates.longitude, coordinates.latitude]
    }
}

/// An ordered sequence of points approximating a driver's path, origin first.
/// Immutable once attached to a ride.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteGeometry(pub Vec<Coordinates>);

impl RouteGeometry {
    pub fn points(&self) -> &[Coordinates] {
        &self.0
    }

    pub fn is_usable(&self) -> bool {
        self.0.len() >= 2 && self.0.iter().all(Coordinates::is_plausible)
    }

    /// Builds a stand-in polyline of evenly interpolated waypoints when the
    /// routing backend cannot supply a real one.
    pub fn synthesize(source: Coordinates, destination: Coordinates, waypoints: usize) -> Self {
        let segments = (waypoints.max(2) - 1) as f64;

        let points = (0..waypoints.max(2))
            .map(|i| {
                let t = i as f64 / segments;
                Coordinates::new(
                    source.longitude + (destination.longitude - source.longitude) * t,
                    source.latitude + (destination.latitude - source.latitude) * t,
                )
            })
            .collect();

        Self(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_serialize_longitude_first() {
        let point = Coordinates::new(80.27, 13.08);
        let json = serde_json::to_string(&point).unwrap();

        assert_eq!(json, "[80.27,13.08]");

        let back: Coordinates = serde_json::from_str(&json).unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn null_island_is_not_plausible() {
        assert!(!Coordinates::new(0.0, 0.0).is_plausible());
        assert!(!Coordinates::new(200.0, 13.0).is_plausible());
        assert!(Coordinates::new(80.27, 13.08).is_plausible());
    }

    #[test]
    fn synthesized_geometry_spans_endpoints() {
        let source = Coordinates::new(80.0, 13.0);
        let destination = Coordinates::new(78.0, 12.0);
        let geometry = RouteGeometry::synthesize(source, destination, 6);

        assert_eq!(geometry.points().len(), 6);
        assert_eq!(geometry.points()[0], source);
        assert_eq!(geometry.points()[5], destination);
        assert!(geometry.is_usable());
    }
}
