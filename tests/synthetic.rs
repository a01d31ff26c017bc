//! Tests running the engines over generated data
#![cfg(feature = "synthetic")]

use trajprep::cleaning::{clean_gps_jumps_by_distance, filter_jumps};
use trajprep::config::DEFAULT_MAX_ITERATIONS;
use trajprep::synthetic::{MapMatchedScenario, SyntheticScenario};
use trajprep::{compute_distance_features, GroupKey, Pipeline};

#[test]
fn test_injected_jumps_are_removed() {
    let dataset = SyntheticScenario {
        object_count: 4,
        points_per_object: 300,
        jump_probability: 0.02,
        seed: 11,
        ..SyntheticScenario::default()
    }
    .generate();
    assert!(dataset.metadata.jumps_injected > 0);

    let mut table = dataset.table;
    let key = GroupKey::ObjectId;
    let report =
        clean_gps_jumps_by_distance(&mut table, key, 1.0, 3.0, DEFAULT_MAX_ITERATIONS).unwrap();
    assert!(report.rows_dropped > 0);

    compute_distance_features(&mut table, key, true);
    assert!(filter_jumps(&table, 1.0, 3.0).iter().all(|&jump| !jump));
}

#[test]
fn test_pipeline_splits_on_gaps() {
    let dataset = SyntheticScenario {
        object_count: 3,
        points_per_object: 400,
        gap_probability: 0.01,
        stop_probability: 0.01,
        seed: 5,
        ..SyntheticScenario::default()
    }
    .generate();
    let gaps = dataset.metadata.gaps_injected;
    let mut table = dataset.table;

    let report = Pipeline::new().run(&mut table).unwrap();
    assert!(report.output_points <= report.input_points);
    assert!(gaps == 0 || report.segmentation.segments > report.segmentation.groups);
    assert!(table
        .points()
        .iter()
        .all(|p| (p.speed_to_prev <= 50.0 || p.speed_to_prev.is_nan())
            && (p.dist_to_prev > 10.0 || p.dist_to_prev.is_nan())));
}

#[test]
fn test_map_matched_repair_and_interpolation() {
    let dataset = MapMatchedScenario {
        trajectory_count: 4,
        samples_per_trajectory: 80,
        out_of_order_probability: 0.1,
        ..MapMatchedScenario::default()
    }
    .generate();
    assert!(dataset.out_of_order_injected > 0);

    let mut table = dataset.table;
    let report = Pipeline::new().run_map_matched(&mut table).unwrap();
    assert!(report.repair.points_deleted >= 1);
    assert!(report.interpolation.dropped_groups.is_empty());
    assert!(table.points().iter().filter(|p| p.is_node).all(|p| p.timestamp > 0));
}
