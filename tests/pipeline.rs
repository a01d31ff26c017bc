//! Tests for pipeline module

use trajprep::config::{PipelineConfig, SegmentationConfig};
use trajprep::geo_utils::meters_to_degrees;
use trajprep::{GroupKey, Pipeline, TrajectoryError, TrajectoryPoint, TrajectoryTable};

fn at(id: &str, east: f64, north: f64, seconds: i64) -> TrajectoryPoint {
    TrajectoryPoint::new(
        id,
        meters_to_degrees(north, 0.0),
        meters_to_degrees(east, 0.0),
        seconds * 1000,
    )
}

/// One object with a jump, a near-duplicate and a three-hour gap, plus a
/// single-point object.
fn raw_table() -> TrajectoryTable {
    TrajectoryTable::new(vec![
        at("a", 0.0, 0.0, 0),
        at("a", 100.0, 0.0, 10),
        at("a", 200.0, 0.0, 20),
        at("a", 300.0, 5000.0, 30),
        at("a", 300.0, 0.0, 40),
        at("a", 303.0, 0.0, 50),
        at("a", 400.0, 0.0, 60),
        at("a", 500.0, 0.0, 70),
        at("b", 0.0, 0.0, 0),
        at("a", 4500.0, 0.0, 10_870),
        at("a", 4600.0, 0.0, 10_880),
        at("a", 4700.0, 0.0, 10_890),
        at("a", 4800.0, 0.0, 10_900),
    ])
}

#[test]
fn test_run_cleans_and_segments() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut table = raw_table();
    let report = Pipeline::new().run(&mut table).unwrap();

    assert_eq!(report.input_points, 13);
    assert_eq!(report.invalid_points, 0);
    assert_eq!(report.jumps.rows_dropped, 1);
    assert_eq!(report.nearby_by_distance.rows_dropped, 1);
    assert_eq!(report.nearby_by_speed.rows_dropped, 0);
    assert_eq!(report.speed_ceiling.rows_dropped, 0);
    assert_eq!(report.short_trajectories.rows_dropped, 1);
    assert_eq!(report.segmentation.segments, 2);
    assert_eq!(report.output_points, 10);
    assert_eq!(report.features.groups, 2);

    let segments: Vec<u64> = table.points().iter().map(|p| p.segment_id.unwrap()).collect();
    assert_eq!(segments, vec![1, 1, 1, 1, 1, 1, 2, 2, 2, 2]);
    assert!(table.points().iter().all(|p| p.object_id == "a"));
}

#[test]
fn test_features_do_not_span_segments() {
    let mut table = raw_table();
    Pipeline::new().run(&mut table).unwrap();
    let points = table.points();
    // Last point of segment 1 and first of segment 2
    assert!(points[5].dist_to_next.is_nan());
    assert!(points[6].dist_to_prev.is_nan());
    assert!(points[6].time_to_prev.is_nan());
}

#[test]
fn test_rerun_is_a_no_op() {
    let mut table = raw_table();
    let pipeline = Pipeline::new();
    pipeline.run(&mut table).unwrap();
    let segments: Vec<Option<u64>> = table.points().iter().map(|p| p.segment_id).collect();

    let report = pipeline.run(&mut table).unwrap();
    assert_eq!(report.input_points, report.output_points);
    assert_eq!(report.jumps.rows_dropped, 0);
    assert_eq!(report.short_trajectories.rows_dropped, 0);
    let again: Vec<Option<u64>> = table.points().iter().map(|p| p.segment_id).collect();
    assert_eq!(segments, again);
}

#[test]
fn test_invalid_config_is_rejected_before_running() {
    let config = PipelineConfig {
        segmentation: SegmentationConfig {
            max_dist_between_adj_points: None,
            max_time_between_adj_points: None,
            max_speed_between_adj_points: None,
        },
        ..PipelineConfig::default()
    };
    let mut table = raw_table();
    let result = Pipeline::with_config(config).run(&mut table);
    assert!(matches!(result, Err(TrajectoryError::InvalidConfig(_))));
    assert_eq!(table.len(), 13);
}

#[test]
fn test_custom_config_is_used() {
    let mut config = PipelineConfig::default();
    config.segmentation.max_time_between_adj_points = Some(5.0);
    config.segmentation.max_dist_between_adj_points = None;
    config.segmentation.max_speed_between_adj_points = None;
    let pipeline = Pipeline::with_config(config);
    assert_eq!(pipeline.config().features.key, GroupKey::ObjectId);

    let mut table = raw_table();
    let report = pipeline.run(&mut table).unwrap();
    // Every remaining edge is at least ten seconds long
    assert_eq!(report.segmentation.segments, 10);
}

#[test]
fn test_run_map_matched() {
    let observed =
        |d: f64, s: i64| TrajectoryPoint::observed("car", 0.0, 0.0, s * 1000, d).with_tid("t1");
    let node = |d: f64| TrajectoryPoint::node("car", 0.0, 0.0, d, 50.0).with_tid("t1");
    let mut table = TrajectoryTable::new(vec![
        observed(0.0, 0),
        node(50.0),
        observed(100.0, 10),
        observed(150.0, 5),
        node(175.0),
        observed(200.0, 20),
    ]);

    let report = Pipeline::new().run_map_matched(&mut table).unwrap();
    assert_eq!(report.repair.points_deleted, 1);
    assert_eq!(report.repair.rows_dropped, 1);
    assert_eq!(report.interpolation.nodes_interpolated, 2);
    let times: Vec<i64> = table.points().iter().map(|p| p.timestamp).collect();
    assert_eq!(times, vec![0, 5_000, 10_000, 17_500, 20_000]);
}
