//! Geographic utilities: great-circle distance and grid cell lookup.

use serde::{Deserialize, Serialize};

/// Mean earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance in meters between two points given in degrees.
///
/// Any NaN coordinate yields NaN, which is how undefined neighbors propagate
/// through the feature engine.
///
/// This is written out rather than using `geo::Haversine`, whose radius is
/// the IUGG mean of 6 371 008.8 m. Pinning [`EARTH_RADIUS_METERS`] keeps
/// distances (and every threshold tuned against them) on a 6371 km sphere.
///
/// # Example
/// ```
/// use trajprep::geo_utils::haversine_distance;
/// // London to Paris is roughly 344 km
/// let d = haversine_distance(51.5074, -0.1278, 48.8566, 2.3522);
/// assert!((d - 343_500.0).abs() < 5_000.0);
/// ```
#[inline]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let a = ((lat2 - lat1) / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * ((lon2 - lon1) / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Vectorized haversine over equal-length coordinate sequences.
///
/// Returns one distance per index. Sequences of different lengths are
/// truncated to the shortest.
pub fn haversine(lat1: &[f64], lon1: &[f64], lat2: &[f64], lon2: &[f64]) -> Vec<f64> {
    lat1.iter()
        .zip(lon1)
        .zip(lat2.iter().zip(lon2))
        .map(|((&la1, &lo1), (&la2, &lo2))| haversine_distance(la1, lo1, la2, lo2))
        .collect()
}

/// A regular lat/lon grid anchored at its south-west corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Latitude of the grid origin (south edge).
    pub lat_min: f64,
    /// Longitude of the grid origin (west edge).
    pub lon_min: f64,
    /// Cell height in degrees of latitude.
    pub cell_size_lat: f64,
    /// Cell width in degrees of longitude.
    pub cell_size_lon: f64,
}

impl GridSpec {
    /// Build a grid over a bounding box with square cells of `cell_size_meters`.
    ///
    /// Cell sizes are converted to degrees at the box's southern latitude.
    pub fn from_bbox(bbox: &crate::BoundingBox, cell_size_meters: f64) -> Self {
        Self {
            lat_min: bbox.min_lat,
            lon_min: bbox.min_lon,
            cell_size_lat: meters_to_degrees(cell_size_meters, 0.0),
            cell_size_lon: meters_to_degrees(cell_size_meters, bbox.min_lat),
        }
    }
}

/// Integer `(row, col)` of the grid cell containing a point.
///
/// Points south or west of the origin get negative indices.
pub fn point_to_index_grid(lat: f64, lon: f64, grid: &GridSpec) -> (i64, i64) {
    let row = ((lat - grid.lat_min) / grid.cell_size_lat).floor() as i64;
    let col = ((lon - grid.lon_min) / grid.cell_size_lon).floor() as i64;
    (row, col)
}

/// Convert a distance in meters to degrees of longitude at the given latitude.
///
/// At the equator this is also the latitude conversion.
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let meters_per_degree = EARTH_RADIUS_METERS.to_radians() * latitude.to_radians().cos();
    meters / meters_per_degree
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_propagates() {
        assert!(haversine_distance(f64::NAN, 0.0, 1.0, 1.0).is_nan());
    }

    #[test]
    fn grid_floor_for_negative_offsets() {
        let grid = GridSpec {
            lat_min: 0.0,
            lon_min: 0.0,
            cell_size_lat: 1.0,
            cell_size_lon: 1.0,
        };
        assert_eq!(point_to_index_grid(-0.5, 2.5, &grid), (-1, 2));
    }
}
