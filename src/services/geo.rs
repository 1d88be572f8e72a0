// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Great-circle distance and nearest key point selection.

use crate::models::KeyPoint;
use geo::Point;

/// Spherical Earth radius used for haversine distances.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Distance at or below which a tourist has reached a key point.
pub const PROXIMITY_THRESHOLD_METERS: f64 = 50.0;

/// Haversine distance in meters between two points (x = lon, y = lat, degrees).
pub fn haversine_distance(a: Point<f64>, b: Point<f64>) -> f64 {
    let lat1 = a.y().to_radians();
    let lat2 = b.y().to_radians();
    let delta_lat = (b.y() - a.y()).to_radians();
    let delta_lon = (b.x() - a.x()).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push h marginally past 1 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_METERS * c
}

/// Nearest candidate within `threshold_meters` of `here`.
///
/// Equal distances are broken by the lowest `order`, then the lowest id.
pub fn nearest_within<'a, I>(
    here: Point<f64>,
    candidates: I,
    threshold_meters: f64,
) -> Option<(&'a KeyPoint, f64)>
where
    I: IntoIterator<Item = &'a KeyPoint>,
{
    candidates
        .into_iter()
        .map(|kp| (kp, haversine_distance(here, kp.point())))
        .filter(|(_, distance)| *distance <= threshold_meters)
        .min_by(|(a, da), (b, db)| da.total_cmp(db).then_with(|| a.display_cmp(b)))
}
