//! Tests for geo_utils module

use trajprep::geo_utils::*;
use trajprep::BoundingBox;

fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

#[test]
fn test_haversine_distance_same_point() {
    assert_eq!(haversine_distance(51.5074, -0.1278, 51.5074, -0.1278), 0.0);
}

#[test]
fn test_haversine_distance_known_value() {
    // London to Paris is approximately 344 km
    let dist = haversine_distance(51.5074, -0.1278, 48.8566, 2.3522);
    assert!(approx_eq(dist, 343_560.0, 5000.0)); // Within 5km
}

#[test]
fn test_haversine_one_degree_on_equator() {
    let dist = haversine_distance(0.0, 0.0, 0.0, 1.0);
    assert!(approx_eq(dist, 111_194.93, 1.0));
}

#[test]
fn test_haversine_is_symmetric() {
    let ab = haversine_distance(-3.7972, -38.5014, -3.7311, -38.5267);
    let ba = haversine_distance(-3.7311, -38.5267, -3.7972, -38.5014);
    assert!(approx_eq(ab, ba, 1e-9));
}

#[test]
fn test_vectorized_matches_scalar() {
    let lat1 = [0.0, 10.0, f64::NAN];
    let lon1 = [0.0, 20.0, 0.0];
    let lat2 = [0.0, 10.5, 1.0];
    let lon2 = [0.2, 20.5, 1.0];
    let out = haversine(&lat1, &lon1, &lat2, &lon2);
    assert_eq!(out.len(), 3);
    assert_eq!(out[0], haversine_distance(0.0, 0.0, 0.0, 0.2));
    assert_eq!(out[1], haversine_distance(10.0, 20.0, 10.5, 20.5));
    assert!(out[2].is_nan());
}

#[test]
fn test_meters_to_degrees_equator() {
    let deg = meters_to_degrees(111_194.93, 0.0);
    assert!(approx_eq(deg, 1.0, 1e-6));
    // Longitude degrees get wider in meters toward the poles
    assert!(meters_to_degrees(1000.0, 60.0) > meters_to_degrees(1000.0, 0.0));
}

#[test]
fn test_point_to_index_grid() {
    let grid = GridSpec {
        lat_min: -4.0,
        lon_min: -39.0,
        cell_size_lat: 0.5,
        cell_size_lon: 0.25,
    };
    assert_eq!(point_to_index_grid(-4.0, -39.0, &grid), (0, 0));
    assert_eq!(point_to_index_grid(-3.2, -38.6, &grid), (1, 1));
    assert_eq!(point_to_index_grid(-4.1, -39.1, &grid), (-1, -1));
}

#[test]
fn test_grid_from_bbox() {
    let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
    let grid = GridSpec::from_bbox(&bbox, 111_194.93);
    assert!(approx_eq(grid.cell_size_lat, 1.0, 1e-6));
    assert!(approx_eq(grid.cell_size_lon, 1.0, 1e-6));
    assert_eq!(point_to_index_grid(0.5, 0.5, &grid), (0, 0));
}
