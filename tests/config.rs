//! Tests for config module

use trajprep::config::*;
use trajprep::{GroupKey, TrajectoryError};

#[test]
fn test_defaults() {
    let config = PipelineConfig::default();
    assert_eq!(config.features.key, GroupKey::ObjectId);
    assert!(config.features.sort);
    assert_eq!(config.cleaning.jumps.coefficient, 3.0);
    assert_eq!(config.cleaning.jumps.threshold, 1.0);
    assert_eq!(config.cleaning.nearby_radius, 10.0);
    assert_eq!(config.cleaning.max_speed, 50.0);
    assert_eq!(config.cleaning.min_points_per_trajectory, 2);
    assert_eq!(config.cleaning.min_trajectory_distance, 100.0);
    assert_eq!(config.cleaning.max_iterations, DEFAULT_MAX_ITERATIONS);
    assert_eq!(config.segmentation.max_dist_between_adj_points, Some(3000.0));
    assert_eq!(config.segmentation.max_time_between_adj_points, Some(7200.0));
    assert_eq!(config.map_matching.key, GroupKey::TrajectoryId);
    assert_eq!(config.map_matching.max_dist_between_adj_points, 5000.0);
    assert_eq!(config.map_matching.max_time_between_adj_points, 900.0);
    assert_eq!(config.map_matching.max_speed, 30.0);
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_rejects_negative_radius() {
    let mut config = CleaningConfig::default();
    config.nearby_radius = -1.0;
    assert!(matches!(
        config.validate(),
        Err(TrajectoryError::InvalidConfig(msg)) if msg.contains("nearby_radius")
    ));
}

#[test]
fn test_validate_rejects_nan_speed() {
    let mut config = PipelineConfig::default();
    config.map_matching.max_speed = f64::NAN;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_zero_iterations() {
    let config = CleaningConfig {
        max_iterations: 0,
        ..CleaningConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_segmentation_needs_a_threshold() {
    let config = SegmentationConfig {
        max_dist_between_adj_points: None,
        max_time_between_adj_points: None,
        max_speed_between_adj_points: None,
    };
    assert!(config.validate().is_err());

    let config = SegmentationConfig {
        max_dist_between_adj_points: None,
        max_time_between_adj_points: Some(600.0),
        max_speed_between_adj_points: None,
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_json_fills_defaults() {
    let json = r#"{
        "features": { "key": "trajectory_id" },
        "cleaning": { "max_speed": 30.0, "jumps": { "coefficient": 2.5 } }
    }"#;
    let config: PipelineConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.features.key, GroupKey::TrajectoryId);
    assert!(config.features.sort);
    assert_eq!(config.cleaning.max_speed, 30.0);
    assert_eq!(config.cleaning.jumps.coefficient, 2.5);
    assert_eq!(config.cleaning.jumps.threshold, 1.0);
    assert_eq!(config.cleaning.nearby_radius, 10.0);
    assert_eq!(config.segmentation.max_dist_between_adj_points, Some(3000.0));
}

#[test]
fn test_json_round_trip() {
    let mut config = PipelineConfig::default();
    config.segmentation.max_speed_between_adj_points = None;
    config.map_matching.drop_deleted = false;
    let json = serde_json::to_string(&config).unwrap();
    let back: PipelineConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.segmentation.max_speed_between_adj_points, None);
    assert!(!back.map_matching.drop_deleted);
    assert_eq!(back.cleaning.max_speed, config.cleaning.max_speed);
}
