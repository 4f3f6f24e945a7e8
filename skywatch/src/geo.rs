//! Geographic primitives: great-circle distance, bearing, polygon
//! containment.
//!
//! Polygons are treated as planar in lat/lon space — regions are local and
//! small, so the error is well below the 0.01 nm working tolerance. A point
//! lying on a polygon edge counts as inside.

pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Edge tolerance for on-boundary classification, in degrees.
const EDGE_EPS: f64 = 1e-9;

/// Great-circle distance in nautical miles.
///
/// NaN coordinates yield an infinite distance, so threshold comparisons
/// resolve to "not near".
pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    if lat1.is_nan() || lon1.is_nan() || lat2.is_nan() || lon2.is_nan() {
        return f64::INFINITY;
    }
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_NM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Initial great-circle bearing from point 1 to point 2, degrees 0..360.
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlon = (lon2 - lon1).to_radians();
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Even-odd (ray casting) point-in-polygon test over `(lat, lon)` vertices.
///
/// Crossings use strict inequality on the latitude axis; a point on an edge
/// or vertex is classified as inside. NaN input is never inside.
pub fn point_in_polygon(lat: f64, lon: f64, polygon: &[(f64, f64)]) -> bool {
    if lat.is_nan() || lon.is_nan() || polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (lat_i, lon_i) = polygon[i];
        let (lat_j, lon_j) = polygon[j];

        if point_on_segment(lat, lon, lat_i, lon_i, lat_j, lon_j) {
            return true;
        }

        if (lat_i > lat) != (lat_j > lat) {
            let lon_cross = (lon_j - lon_i) * (lat - lat_i) / (lat_j - lat_i) + lon_i;
            if lon < lon_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Is (lat, lon) on the segment between the two endpoints, within EDGE_EPS?
fn point_on_segment(lat: f64, lon: f64, lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> bool {
    let cross = (lon_b - lon_a) * (lat - lat_a) - (lat_b - lat_a) * (lon - lon_a);
    if cross.abs() > EDGE_EPS {
        return false;
    }
    let within_lat = lat >= lat_a.min(lat_b) - EDGE_EPS && lat <= lat_a.max(lat_b) + EDGE_EPS;
    let within_lon = lon >= lon_a.min(lon_b) - EDGE_EPS && lon <= lon_a.max(lon_b) + EDGE_EPS;
    within_lat && within_lon
}

/// Convert a radius in nautical miles to lat/lon degree offsets at the given
/// latitude. One degree of latitude is ~60 nm everywhere; longitude degrees
/// compress with the cosine of latitude.
pub fn nm_to_lat_lon_offsets(radius_nm: f64, center_lat: f64) -> (f64, f64) {
    let lat_offset = radius_nm / 60.0;
    let lon_offset = radius_nm / (60.0 * center_lat.to_radians().cos());
    (lat_offset, lon_offset)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
