//! Tests for cleaning module

use trajprep::cleaning::*;
use trajprep::config::DEFAULT_MAX_ITERATIONS as MAX_ITER;
use trajprep::features::compute_features;
use trajprep::geo_utils::meters_to_degrees;
use trajprep::{GroupKey, TrajectoryError, TrajectoryPoint, TrajectoryTable};

const KEY: GroupKey = GroupKey::ObjectId;

/// A point `east` and `north` meters from (0, 0) at `seconds`.
fn at(id: &str, east: f64, north: f64, seconds: i64) -> TrajectoryPoint {
    TrajectoryPoint::new(
        id,
        meters_to_degrees(north, 0.0),
        meters_to_degrees(east, 0.0),
        seconds * 1000,
    )
}

/// Points along the equator at the given distances, ten seconds apart.
fn line(id: &str, meters: &[f64]) -> Vec<TrajectoryPoint> {
    meters
        .iter()
        .enumerate()
        .map(|(i, &m)| at(id, m, 0.0, i as i64 * 10))
        .collect()
}

fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

fn east_positions(table: &TrajectoryTable) -> Vec<i64> {
    table
        .points()
        .iter()
        .map(|p| (p.lon * 111_194.926_6).round() as i64)
        .collect()
}

fn jump_example() -> TrajectoryTable {
    TrajectoryTable::new(vec![
        TrajectoryPoint::new("a", 0.0, 0.0, 0),
        TrajectoryPoint::new("a", 0.0, 0.2, 10_000),
        TrajectoryPoint::new("a", 0.0, 0.001, 20_000),
    ])
}

// ============================================================================
// GPS jumps
// ============================================================================

#[test]
fn test_jump_is_removed() {
    let mut table = jump_example();
    let report = clean_gps_jumps_by_distance(&mut table, KEY, 1.0, 3.0, MAX_ITER).unwrap();
    let lons: Vec<f64> = table.points().iter().map(|p| p.lon).collect();
    assert_eq!(lons, vec![0.0, 0.001]);
    assert_eq!(report.rows_dropped, 1);
    assert_eq!(report.iterations, 2);
}

#[test]
fn test_filter_jumps_does_not_modify() {
    let mut table = jump_example();
    trajprep::compute_distance_features(&mut table, KEY, true);
    let mask = filter_jumps(&table, 1.0, 3.0);
    assert_eq!(mask, vec![false, true, false]);
    assert_eq!(table.len(), 3);
}

#[test]
fn test_straight_track_has_no_jumps() {
    let mut table = TrajectoryTable::new(line("a", &[0.0, 100.0, 200.0, 300.0]));
    let report = clean_gps_jumps_by_distance(&mut table, KEY, 1.0, 3.0, MAX_ITER).unwrap();
    assert_eq!(report.rows_dropped, 0);
    assert_eq!(report.iterations, 1);
    assert_eq!(table.len(), 4);
}

#[test]
fn test_iteration_cap_reports_non_convergence() {
    let mut table = jump_example();
    let result = clean_gps_jumps_by_distance(&mut table, KEY, 1.0, 3.0, 1);
    assert_eq!(
        result,
        Err(TrajectoryError::NonConvergence {
            operation: "gps jumps",
            iterations: 1
        })
    );
}

// ============================================================================
// Nearby points
// ============================================================================

#[test]
fn test_nearby_points_by_distance() {
    let mut table = TrajectoryTable::new(line("a", &[0.0, 5.0, 20.0, 25.0, 60.0]));
    let report =
        clean_gps_nearby_points_by_distances(&mut table, KEY, 10.0, MAX_ITER).unwrap();
    assert_eq!(east_positions(&table), vec![0, 20, 60]);
    assert_eq!(report.rows_dropped, 2);
    assert_eq!(report.iterations, 2);
}

#[test]
fn test_nearby_points_cascade() {
    // Removing the second point brings the third within the radius of the first
    let mut table = TrajectoryTable::new(line("a", &[0.0, -8.0, 5.0, 100.0]));
    let report =
        clean_gps_nearby_points_by_distances(&mut table, KEY, 10.0, MAX_ITER).unwrap();
    assert_eq!(east_positions(&table), vec![0, 100]);
    assert_eq!(report.rows_dropped, 2);
    assert_eq!(report.iterations, 3);
}

#[test]
fn test_nearby_points_by_speed() {
    let mut table = TrajectoryTable::new(vec![
        at("a", 0.0, 0.0, 0),
        at("a", 0.0, 0.0, 10),
        at("a", 100.0, 0.0, 20),
    ]);
    let report = clean_gps_nearby_points_by_speed(&mut table, KEY, 0.0, MAX_ITER).unwrap();
    assert_eq!(report.rows_dropped, 1);
    assert_eq!(table.len(), 2);
    assert_eq!(table.points()[1].timestamp, 20_000);
}

// ============================================================================
// Speed ceiling
// ============================================================================

/// At most `max`, or undefined.
fn within(value: f64, max: f64) -> bool {
    value <= max || value.is_nan()
}

fn spike_track(spike_at: usize) -> TrajectoryTable {
    TrajectoryTable::new(
        (0..5)
            .map(|i| {
                let north = if i == spike_at { 1200.0 } else { 0.0 };
                at("a", i as f64 * 100.0, north, i as i64 * 10)
            })
            .collect(),
    )
}

#[test]
fn test_speed_spike_costs_one_point() {
    let mut table = spike_track(2);
    compute_features(&mut table, KEY, true);
    assert!(table.points()[2].speed_to_prev > 100.0);

    let report = clean_gps_speed_max_radius(&mut table, KEY, 50.0, MAX_ITER).unwrap();
    assert_eq!(east_positions(&table), vec![0, 100, 300, 400]);
    assert_eq!(report.rows_dropped, 1);
    assert_eq!(report.iterations, 2);
}

#[test]
fn test_speed_outlier_at_start() {
    let mut table = spike_track(0);
    clean_gps_speed_max_radius(&mut table, KEY, 50.0, MAX_ITER).unwrap();
    assert_eq!(east_positions(&table), vec![100, 200, 300, 400]);
}

#[test]
fn test_speed_outlier_at_end() {
    let mut table = spike_track(4);
    clean_gps_speed_max_radius(&mut table, KEY, 50.0, MAX_ITER).unwrap();
    assert_eq!(east_positions(&table), vec![0, 100, 200, 300]);
}

#[test]
fn test_two_point_group_drops_point_reached_too_fast() {
    // 1200 m in 10 s is 120 m/s into the second point
    let mut table = TrajectoryTable::new(vec![at("a", 0.0, 0.0, 0), at("a", 1200.0, 0.0, 10)]);
    compute_features(&mut table, KEY, true);
    assert!(approx_eq(table.points()[1].speed_to_prev, 120.0, 0.01));

    let report = clean_gps_speed_max_radius(&mut table, KEY, 50.0, MAX_ITER).unwrap();
    assert_eq!(east_positions(&table), vec![0]);
    assert_eq!(report.rows_dropped, 1);
    assert_eq!(report.iterations, 2);
}

#[test]
fn test_fast_last_edge_drops_arrival() {
    let mut table = TrajectoryTable::new(line("a", &[0.0, 100.0, 200.0, 1400.0]));
    clean_gps_speed_max_radius(&mut table, KEY, 50.0, MAX_ITER).unwrap();
    assert_eq!(east_positions(&table), vec![0, 100, 200]);
}

#[test]
fn test_speed_ceiling_leaves_no_fast_edge() {
    let mut points = line("a", &[0.0, 100.0, 1500.0, 1600.0, 3600.0, 3700.0]);
    points.extend(line("b", &[0.0, 2000.0, 2100.0]));
    let mut table = TrajectoryTable::new(points);
    let before = table.len();
    clean_gps_speed_max_radius(&mut table, KEY, 50.0, MAX_ITER).unwrap();
    compute_features(&mut table, KEY, true);
    assert!(table.len() < before);
    assert!(table
        .points()
        .iter()
        .all(|p| within(p.speed_to_prev, 50.0) && within(p.speed_to_next, 50.0)));
}

// ============================================================================
// Whole trajectories
// ============================================================================

fn three_objects() -> TrajectoryTable {
    let mut points = line("a", &[0.0, 20.0, 50.0]);
    points.extend(line("b", &[0.0]));
    points.extend(line("c", &[0.0, 150.0, 300.0]));
    TrajectoryTable::new(points)
}

#[test]
fn test_short_and_few_points() {
    let mut table = three_objects();
    let report =
        clean_traj_short_and_few_points(&mut table, KEY, 2, 100.0, MAX_ITER).unwrap();
    assert!(table.points().iter().all(|p| p.object_id == "c"));
    assert_eq!(table.len(), 3);
    assert_eq!(report.rows_dropped, 4);
    assert_eq!(report.iterations, 2);
}

#[test]
fn test_few_points_single_pass() {
    let mut table = three_objects();
    assert_eq!(clean_traj_with_few_points(&mut table, KEY, 3), 1);
    assert_eq!(table.group_count(KEY), 2);
    assert_eq!(clean_traj_with_few_points(&mut table, KEY, 3), 0);
}

#[test]
fn test_clean_id_by_time_max() {
    let mut points = line("a", &[0.0, 20.0, 50.0]);
    points.extend(line("c", &[0.0, 150.0, 300.0, 450.0, 600.0, 750.0, 900.0, 1050.0]));
    let mut table = TrajectoryTable::new(points);
    compute_features(&mut table, KEY, true);
    assert_eq!(clean_id_by_time_max(&mut table, KEY, 60.0), 3);
    assert!(table.points().iter().all(|p| p.object_id == "c"));
}

// ============================================================================
// Duplicates and invalid rows
// ============================================================================

fn with_duplicates() -> TrajectoryTable {
    TrajectoryTable::new(vec![
        TrajectoryPoint::new("a", 1.0, 1.0, 0),
        TrajectoryPoint::new("a", 1.0, 1.0, 0),
        TrajectoryPoint::new("a", 1.0, 1.0, 5_000),
        TrajectoryPoint::new("b", 1.0, 1.0, 0),
    ])
}

#[test]
fn test_clean_duplicates_by_subset() {
    let mut table = with_duplicates();
    assert_eq!(clean_duplicates(&mut table, DuplicateSubset::ObjectLocationTime, false), 1);
    assert_eq!(table.len(), 3);

    let mut table = with_duplicates();
    assert_eq!(clean_duplicates(&mut table, DuplicateSubset::ObjectLocation, false), 2);
    assert_eq!(table.len(), 2);

    let mut table = with_duplicates();
    assert_eq!(clean_duplicates(&mut table, DuplicateSubset::Location, false), 3);
    assert_eq!(table.len(), 1);
}

#[test]
fn test_clean_consecutive_duplicates() {
    let mut table = TrajectoryTable::new(vec![
        TrajectoryPoint::new("a", 0.0, 0.0, 0),
        TrajectoryPoint::new("a", 0.0, 0.0, 1_000),
        TrajectoryPoint::new("a", 1.0, 1.0, 2_000),
        TrajectoryPoint::new("a", 0.0, 0.0, 3_000),
    ]);
    assert_eq!(clean_consecutive_duplicates(&mut table, DuplicateSubset::ObjectLocation), 1);
    let times: Vec<i64> = table.points().iter().map(|p| p.timestamp).collect();
    assert_eq!(times, vec![0, 2_000, 3_000]);
}

#[test]
fn test_clean_invalid_points() {
    let mut table = TrajectoryTable::new(vec![
        TrajectoryPoint::new("a", 0.0, 0.0, 0),
        TrajectoryPoint::new("a", f64::NAN, 0.0, 1_000),
        TrajectoryPoint::new("a", 95.0, 0.0, 2_000),
    ]);
    assert_eq!(clean_invalid_points(&mut table), 2);
    assert_eq!(table.len(), 1);
}

// ============================================================================
// Fixed-point properties
// ============================================================================

fn noisy_table() -> TrajectoryTable {
    let mut points = line("a", &[0.0, 3.0, 100.0, 104.0, 200.0, 5000.0, 300.0, 400.0]);
    points.push(at("a", 450.0, 3000.0, 80));
    points.extend(line("b", &[0.0, 1.0, 2.0]));
    points.extend(line("c", &[0.0, 150.0, 300.0, 305.0, 450.0]));
    TrajectoryTable::new(points)
}

#[test]
fn test_cleaning_only_shrinks_and_is_idempotent() {
    type Policy = fn(&mut TrajectoryTable) -> trajprep::Result<CleaningReport>;
    let policies: [Policy; 5] = [
        |t| clean_gps_jumps_by_distance(t, KEY, 1.0, 3.0, MAX_ITER),
        |t| clean_gps_nearby_points_by_distances(t, KEY, 10.0, MAX_ITER),
        |t| clean_gps_nearby_points_by_speed(t, KEY, 1.0, MAX_ITER),
        |t| clean_gps_speed_max_radius(t, KEY, 50.0, MAX_ITER),
        |t| clean_traj_short_and_few_points(t, KEY, 2, 100.0, MAX_ITER),
    ];

    for policy in policies {
        let original = noisy_table();
        let mut table = original.clone();
        let report = policy(&mut table).unwrap();
        assert_eq!(original.len() - table.len(), report.rows_dropped);
        assert!(table
            .points()
            .iter()
            .all(|p| original.points().iter().any(|o| o.object_id == p.object_id
                && o.timestamp == p.timestamp
                && o.lat == p.lat
                && o.lon == p.lon)));

        let again = policy(&mut table).unwrap();
        assert_eq!(again.rows_dropped, 0);
        assert_eq!(again.iterations, 1);
    }
}
