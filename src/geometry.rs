use std::env;

use crate::entities::{Coordinates, RouteGeometry};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Tuning knobs for route matching. The defaults are the tolerances the
/// engine ships with; every one of them can be overridden from the
/// environment because they are empirical, not derived.
#[derive(Clone, Debug)]
pub struct MatchConfig {
    /// Maximum lateral distance from the driver's path, in km.
    pub max_lateral_km: f64,
    /// Radius within which a point counts as "at" a route endpoint.
    pub endpoint_km: f64,
    /// Slack allowed by the same-direction ordering check.
    pub ordering_slack_km: f64,
    /// Passenger journey may not exceed this multiple of the driver's.
    pub max_length_ratio: f64,
    /// Below this fraction of the driver's journey, one on-route endpoint
    /// is enough.
    pub short_segment_ratio: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_lateral_km: 30.0,
            endpoint_km: 10.0,
            ordering_slack_km: 10.0,
            max_length_ratio: 1.5,
            short_segment_ratio: 0.3,
        }
    }
}

impl MatchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_lateral_km: env_f64("MATCH_MAX_LATERAL_KM", defaults.max_lateral_km),
            endpoint_km: env_f64("MATCH_ENDPOINT_KM", defaults.endpoint_km),
            ordering_slack_km: env_f64("MATCH_ORDERING_SLACK_KM", defaults.ordering_slack_km),
            max_length_ratio: env_f64("MATCH_MAX_LENGTH_RATIO", defaults.max_length_ratio),
            short_segment_ratio: env_f64("MATCH_SHORT_SEGMENT_RATIO", defaults.short_segment_ratio),
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

/// The passenger's side of a match: free text plus coordinates when they
/// could be resolved. Coordinates are resolved once, up front, by the caller;
/// this module performs no I/O.
#[derive(Clone, Debug)]
pub struct SearchPoints<'a> {
    pub source_text: &'a str,
    pub destination_text: &'a str,
    pub source: Option<Coordinates>,
    pub destination: Option<Coordinates>,
}

/// The driver's side of a match, as stored on the ride.
#[derive(Clone, Debug)]
pub struct DriverRoute<'a> {
    pub source_text: &'a str,
    pub destination_text: &'a str,
    pub source: Option<Coordinates>,
    pub destination: Option<Coordinates>,
    pub geometry: Option<&'a RouteGeometry>,
}

/// Decides whether the passenger's sub-journey lies along the driver's route.
///
/// Text equivalence short-circuits to a match. Otherwise all four coordinates
/// must be present and plausible; if any is not, the text result stands and
/// an unresolvable ride is never treated as a geometric match.
pub fn matches_route(search: &SearchPoints, route: &DriverRoute, config: &MatchConfig) -> bool {
    let text_matched = text_match(search.source_text, route.source_text)
        && text_match(search.destination_text, route.destination_text);

    if text_matched {
        return true;
    }

    let (ps, pd, ds, dd) = match (
        plausible(search.source),
        plausible(search.destination),
        plausible(route.source),
        plausible(route.destination),
    ) {
        (Some(ps), Some(pd), Some(ds), Some(dd)) => (ps, pd, ds, dd),
        _ => return false,
    };

    // identical or exactly reversed endpoints match outright
    let forward = haversine_km(ps, ds) <= config.endpoint_km
        && haversine_km(pd, dd) <= config.endpoint_km;
    let reverse = haversine_km(ps, dd) <= config.endpoint_km
        && haversine_km(pd, ds) <= config.endpoint_km;

    if forward || reverse {
        return true;
    }

    let driver_length = haversine_km(ds, dd);
    let passenger_length = haversine_km(ps, pd);

    if driver_length < 1e-6 {
        return false;
    }

    // guards against degenerate matches on long, nearly parallel geometries
    if passenger_length > config.max_length_ratio * driver_length {
        return false;
    }

    // the passenger must travel in the driver's direction
    if haversine_km(ps, ds) > haversine_km(pd, ds) + config.ordering_slack_km {
        return false;
    }

    let short_segment = passenger_length <= config.short_segment_ratio * driver_length;

    match route.geometry.filter(|geometry| geometry.is_usable()) {
        Some(geometry) => {
            polyline_match(ps, pd, geometry, short_segment, config)
        }
        None => endpoint_fallback_match(ps, pd, ds, dd, short_segment, config),
    }
}

fn plausible(point: Option<Coordinates>) -> Option<Coordinates> {
    point.filter(Coordinates::is_plausible)
}

/// Case-insensitive substring match after stripping locale suffixes, so that
/// "Chennai, Tamil Nadu" and "chennai" are the same place.
pub fn text_match(a: &str, b: &str) -> bool {
    let a = normalize_place(a);
    let b = normalize_place(b);

    if a.is_empty() || b.is_empty() {
        return false;
    }

    a.contains(&b) || b.contains(&a)
}

fn normalize_place(text: &str) -> String {
    text.split(',')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

/// Great-circle distance, R = 6371 km. Road topology is deliberately
/// ignored; the lateral tolerance band absorbs the difference.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lon1) = (a.latitude.to_radians(), a.longitude.to_radians());
    let (lat2, lon2) = (b.latitude.to_radians(), b.longitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Where a point falls relative to a polyline: how far off the path it is,
/// and how far along the path its nearest point sits.
#[derive(Clone, Copy, Debug)]
struct Projection {
    lateral_km: f64,
    arc_km: f64,
}

fn polyline_match(
    ps: Coordinates,
    pd: Coordinates,
    geometry: &RouteGeometry,
    short_segment: bool,
    config: &MatchConfig,
) -> bool {
    let source = project_onto_polyline(ps, geometry);
    let destination = project_onto_polyline(pd, geometry);

    let source_on = source.lateral_km <= config.max_lateral_km;
    let destination_on = destination.lateral_km <= config.max_lateral_km;

    let on_route = if short_segment {
        source_on || destination_on
    } else {
        source_on && destination_on
    };

    if !on_route {
        return false;
    }

    // nearest-point positions must preserve travel order, with a little
    // backward slack for curvature
    source.arc_km <= destination.arc_km + config.ordering_slack_km
}

fn endpoint_fallback_match(
    ps: Coordinates,
    pd: Coordinates,
    ds: Coordinates,
    dd: Coordinates,
    short_segment: bool,
    config: &MatchConfig,
) -> bool {
    let source_on = within_corridor(ps, ds, dd, config.max_lateral_km);
    let destination_on = within_corridor(pd, ds, dd, config.max_lateral_km);

    if source_on && destination_on {
        return true;
    }

    // a passenger riding from/to the driver's exact start or end only needs
    // the other endpoint on-route
    let source_at_endpoint = haversine_km(ps, ds) <= config.endpoint_km
        || haversine_km(ps, dd) <= config.endpoint_km;
    let destination_at_endpoint = haversine_km(pd, ds) <= config.endpoint_km
        || haversine_km(pd, dd) <= config.endpoint_km;

    if (source_at_endpoint && destination_on) || (destination_at_endpoint && source_on) {
        return true;
    }

    short_segment && (source_on || destination_on)
}

/// Ellipse approximation for "point near the segment AB":
/// |P-A| + |P-B| - |A-B| within tolerance.
fn within_corridor(p: Coordinates, a: Coordinates, b: Coordinates, tolerance_km: f64) -> bool {
    haversine_km(p, a) + haversine_km(p, b) - haversine_km(a, b) <= tolerance_km
}

fn project_onto_polyline(p: Coordinates, geometry: &RouteGeometry) -> Projection {
    let points = geometry.points();

    let mut best = Projection {
        lateral_km: f64::INFINITY,
        arc_km: 0.0,
    };
    let mut walked_km = 0.0;

    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let (t, nearest) = project_onto_segment(p, a, b);
        let lateral_km = haversine_km(p, nearest);
        let segment_km = haversine_km(a, b);

        if lateral_km < best.lateral_km {
            best = Projection {
                lateral_km,
                arc_km: walked_km + t * segment_km,
            };
        }

        walked_km += segment_km;
    }

    best
}

/// Nearest point on segment AB to P, in a local equirectangular plane around
/// A. Good enough at corridor scale; error is dwarfed by the tolerance band.
fn project_onto_segment(
    p: Coordinates,
    a: Coordinates,
    b: Coordinates,
) -> (f64, Coordinates) {
    let scale = a.latitude.to_radians().cos();

    let px = (p.longitude - a.longitude) * scale;
    let py = p.latitude - a.latitude;
    let bx = (b.longitude - a.longitude) * scale;
    let by = b.latitude - a.latitude;

    let length_squared = bx * bx + by * by;

    let t = if length_squared < 1e-12 {
        0.0
    } else {
        ((px * bx + py * by) / length_squared).clamp(0.0, 1.0)
    };

    let nearest = Coordinates::new(
        a.longitude + (b.longitude - a.longitude) * t,
        a.latitude + (b.latitude - a.latitude) * t,
    );

    (t, nearest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHENNAI: Coordinates = Coordinates {
        longitude: 80.27,
        latitude: 13.08,
    };
    const BANGALORE: Coordinates = Coordinates {
        longitude: 77.59,
        latitude: 12.97,
    };
    const VELLORE: Coordinates = Coordinates {
        longitude: 79.13,
        latitude: 12.92,
    };

    fn highway_polyline() -> RouteGeometry {
        RouteGeometry(vec![
            CHENNAI,
            Coordinates::new(79.70, 13.00),
            Coordinates::new(79.13, 12.95),
            Coordinates::new(78.60, 12.80),
            Coordinates::new(78.00, 12.85),
            BANGALORE,
        ])
    }

    fn driver_route<'a>(geometry: Option<&'a RouteGeometry>) -> DriverRoute<'a> {
        DriverRoute {
            source_text: "Chennai, Tamil Nadu",
            destination_text: "Bangalore, Karnataka",
            source: Some(CHENNAI),
            destination: Some(BANGALORE),
            geometry,
        }
    }

    fn search<'a>(
        source_text: &'a str,
        destination_text: &'a str,
        source: Option<Coordinates>,
        destination: Option<Coordinates>,
    ) -> SearchPoints<'a> {
        SearchPoints {
            source_text,
            destination_text,
            source,
            destination,
        }
    }

    #[test]
    fn haversine_chennai_bangalore_is_about_290_km() {
        let d = haversine_km(CHENNAI, BANGALORE);
        assert!((275.0..305.0).contains(&d), "got {d}");
    }

    #[test]
    fn text_match_strips_locale_suffixes_case_insensitively() {
        assert!(text_match("Chennai, Tamil Nadu", "chennai"));
        assert!(text_match("chennai", "Chennai, Tamil Nadu"));
        assert!(!text_match("Chennai, Tamil Nadu", "Bangalore"));
        assert!(!text_match("", "Bangalore"));
    }

    #[test]
    fn textual_route_match_needs_no_coordinates() {
        let config = MatchConfig::default();
        let route = driver_route(None);
        let query = search("chennai", "BANGALORE, Karnataka", None, None);

        assert!(matches_route(&query, &route, &config));
    }

    #[test]
    fn mid_route_segment_matches_via_polyline_proximity() {
        let config = MatchConfig::default();
        let geometry = highway_polyline();
        let route = driver_route(Some(&geometry));

        // "Vellore" matches neither endpoint textually, only geometrically
        let query = search("Vellore", "Bengaluru", Some(VELLORE), Some(BANGALORE));

        assert!(matches_route(&query, &route, &config));
    }

    #[test]
    fn opposite_direction_segment_is_rejected() {
        let config = MatchConfig::default();
        let geometry = highway_polyline();
        let route = driver_route(Some(&geometry));

        // both points sit on the polyline, but the passenger is heading
        // back towards the driver's origin
        let near_bangalore = Coordinates::new(78.00, 12.85);
        let near_chennai = Coordinates::new(79.70, 13.00);
        let query = search("Hosur side", "Arakkonam side", Some(near_bangalore), Some(near_chennai));

        assert!(!matches_route(&query, &route, &config));
    }

    #[test]
    fn endpoint_fallback_accepts_on_corridor_segment() {
        let config = MatchConfig::default();
        let route = driver_route(None);
        let query = search("Vellore", "Bengaluru", Some(VELLORE), Some(BANGALORE));

        assert!(matches_route(&query, &route, &config));
    }

    #[test]
    fn endpoint_fallback_rejects_far_off_corridor_segment() {
        let config = MatchConfig::default();
        let route = driver_route(None);

        // Madurai is hundreds of km south of the Chennai-Bangalore corridor
        let madurai = Coordinates::new(78.12, 9.93);
        let query = search("Madurai", "Bengaluru", Some(madurai), Some(BANGALORE));

        assert!(!matches_route(&query, &route, &config));
    }

    #[test]
    fn reversed_endpoints_match_immediately() {
        let config = MatchConfig::default();
        let route = driver_route(None);
        let query = search("Bengaluru", "Madras", Some(BANGALORE), Some(CHENNAI));

        assert!(matches_route(&query, &route, &config));
    }

    #[test]
    fn short_hop_needs_only_one_endpoint_on_route() {
        let config = MatchConfig::default();
        let route = driver_route(None);

        // ~60 km hop (< 30% of the driver's journey) near the Chennai end;
        // the destination's corridor detour is well past tolerance, the
        // source is on the corridor
        let on_route = Coordinates::new(80.00, 13.05);
        let off_route = Coordinates::new(80.10, 12.50);
        let query = search("Sriperumbudur side", "Chengalpattu side", Some(on_route), Some(off_route));

        assert!(matches_route(&query, &route, &config));
    }

    #[test]
    fn implausible_coordinates_fall_back_to_text_only() {
        let config = MatchConfig::default();
        let route = driver_route(None);

        let null_island = Coordinates::new(0.0, 0.0);
        let unmatched = search("Vellore", "Bengaluru", Some(null_island), Some(BANGALORE));
        assert!(!matches_route(&unmatched, &route, &config));

        let matched = search("chennai", "bangalore", Some(null_island), Some(BANGALORE));
        assert!(matches_route(&matched, &route, &config));
    }

    #[test]
    fn overlong_segment_is_rejected() {
        let config = MatchConfig::default();
        let route = driver_route(None);

        // Kochi -> Kolkata dwarfs the driver's 290 km route
        let kochi = Coordinates::new(76.27, 9.93);
        let kolkata = Coordinates::new(88.36, 22.57);
        let query = search("Kochi", "Kolkata", Some(kochi), Some(kolkata));

        assert!(!matches_route(&query, &route, &config));
    }

    #[test]
    fn projection_orders_points_along_the_polyline() {
        let geometry = highway_polyline();

        let near_start = project_onto_polyline(Coordinates::new(79.70, 13.00), &geometry);
        let near_end = project_onto_polyline(Coordinates::new(78.00, 12.85), &geometry);

        assert!(near_start.arc_km < near_end.arc_km);
        assert!(near_start.lateral_km < 1.0);
    }
}
