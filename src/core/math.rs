//! Spherical math helpers.
//!
//! Distances use the haversine formula on a spherical Earth; segment
//! subdivision interpolates linearly in latitude/longitude, which is
//! accurate at the 10-20 m scales the engine works with.

use super::types::GeoPoint;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Seconds in a 7-day week bucket.
pub const WEEK_SEC: u64 = 7 * 24 * 60 * 60;

/// Great-circle distance between two points in meters.
pub fn distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Angular distance between two points in radians.
pub fn angular_distance_rad(a: GeoPoint, b: GeoPoint) -> f64 {
    distance_m(a, b) / EARTH_RADIUS_M
}

/// Linear interpolation between two points, `t` in [0, 1].
pub fn lerp(a: GeoPoint, b: GeoPoint, t: f64) -> GeoPoint {
    GeoPoint::new(a.lat + (b.lat - a.lat) * t, a.lon + (b.lon - a.lon) * t)
}

/// Walk a polyline emitting sample points every `step_m` meters, endpoints
/// included. Consecutive duplicate vertices are skipped.
pub fn sample_polyline(points: &[GeoPoint], step_m: f64, mut emit: impl FnMut(GeoPoint)) {
    if points.is_empty() {
        return;
    }
    let mut prev = points[0];
    emit(prev);
    for &curr in &points[1..] {
        let dist = distance_m(prev, curr);
        if dist < 1e-6 {
            continue;
        }
        let segments = (dist / step_m).ceil().max(1.0) as usize;
        for s in 1..=segments {
            emit(lerp(prev, curr, s as f64 / segments as f64));
        }
        prev = curr;
    }
}

/// Subdivide one segment, emitting interior points `i = 1..N-1` with their
/// distance from `p1`, where `N = ceil(dist_m / step_m)`. Neither endpoint
/// is emitted; segments shorter than one step emit nothing.
pub fn segmentize(p1: GeoPoint, p2: GeoPoint, step_m: f64, mut emit: impl FnMut(GeoPoint, f64)) {
    let dist = distance_m(p1, p2);
    if dist < 1e-6 {
        return;
    }
    let segments = (dist / step_m).ceil() as usize;
    if segments <= 1 {
        return;
    }
    for i in 1..segments {
        let t = i as f64 / segments as f64;
        emit(lerp(p1, p2, t), dist * t);
    }
}

/// Closest point to `p` on the segment `a`-`b`, via a local equirectangular
/// projection around `p` (valid at street scales).
pub fn closest_point_on_segment(a: GeoPoint, b: GeoPoint, p: GeoPoint) -> GeoPoint {
    let k = p.lat.to_radians().cos();
    let ax = (a.lon - p.lon) * k;
    let ay = a.lat - p.lat;
    let bx = (b.lon - p.lon) * k;
    let by = b.lat - p.lat;

    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-18 {
        return a;
    }
    let t = (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0);
    lerp(a, b, t)
}

/// UTC 7-day aligned epoch-second bucket.
pub fn week_bucket(timestamp_sec: u64) -> u64 {
    (timestamp_sec / WEEK_SEC) * WEEK_SEC
}
