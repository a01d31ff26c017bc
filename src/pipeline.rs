//! # Preprocessing Pipeline
//!
//! Composes the feature, cleaning, segmentation and map-matching engines in
//! their documented order from a single [`PipelineConfig`].
//!
//! ## Stages
//! - [`Pipeline::run`] for raw GPS tables: features, cleaning passes,
//!   segmentation, then features per segment
//! - [`Pipeline::run_map_matched`] for map-matched tables: ordering repair,
//!   node time interpolation, final validation

use log::info;
use serde::{Deserialize, Serialize};

use crate::cleaning::{
    clean_gps_jumps_by_distance, clean_gps_nearby_points_by_distances,
    clean_gps_nearby_points_by_speed, clean_gps_speed_max_radius, clean_invalid_points,
    clean_traj_short_and_few_points, CleaningReport,
};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::features::{compute_features, FeatureReport};
use crate::mapmatch::{
    check_time_dist, fix_time_not_in_ascending_order, interpolate_node_times,
    InterpolationReport, RepairReport,
};
use crate::segmentation::{segment_trajectories, SegmentationReport, SplitPredicate};
use crate::{GroupKey, TrajectoryTable};

/// Outcome of [`Pipeline::run`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub input_points: usize,
    pub output_points: usize,
    /// Rows dropped for invalid coordinates before any pass
    pub invalid_points: usize,
    pub jumps: CleaningReport,
    pub nearby_by_distance: CleaningReport,
    pub nearby_by_speed: CleaningReport,
    pub speed_ceiling: CleaningReport,
    pub short_trajectories: CleaningReport,
    pub segmentation: SegmentationReport,
    /// Features computed per segment at the end of the run
    pub features: FeatureReport,
}

/// Outcome of [`Pipeline::run_map_matched`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapMatchReport {
    pub repair: RepairReport,
    pub interpolation: InterpolationReport,
}

/// Preprocessing pipeline holding its configuration.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pipeline with custom configuration.
    pub fn with_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Clean, segment and annotate a raw GPS table in place.
    ///
    /// Every cleaning pass groups by the configured feature key. After
    /// segmentation, features are recomputed by [`GroupKey::SegmentId`] so
    /// no edge spans two segments.
    pub fn run(&self, table: &mut TrajectoryTable) -> Result<PipelineReport> {
        self.config.validate()?;
        let key = self.config.features.key;
        let cleaning = &self.config.cleaning;
        let mut report = PipelineReport {
            input_points: table.len(),
            ..PipelineReport::default()
        };
        info!("[Pipeline] Starting with {} points", report.input_points);

        report.invalid_points = clean_invalid_points(table);
        compute_features(table, key, self.config.features.sort);

        report.jumps = clean_gps_jumps_by_distance(
            table,
            key,
            cleaning.jumps.threshold,
            cleaning.jumps.coefficient,
            cleaning.max_iterations,
        )?;
        report.nearby_by_distance = clean_gps_nearby_points_by_distances(
            table,
            key,
            cleaning.nearby_radius,
            cleaning.max_iterations,
        )?;
        report.nearby_by_speed = clean_gps_nearby_points_by_speed(
            table,
            key,
            cleaning.nearby_speed_radius,
            cleaning.max_iterations,
        )?;
        report.speed_ceiling =
            clean_gps_speed_max_radius(table, key, cleaning.max_speed, cleaning.max_iterations)?;
        report.short_trajectories = clean_traj_short_and_few_points(
            table,
            key,
            cleaning.min_points_per_trajectory,
            cleaning.min_trajectory_distance,
            cleaning.max_iterations,
        )?;

        compute_features(table, key, true);
        let predicate = SplitPredicate::from_config(&self.config.segmentation);
        report.segmentation = segment_trajectories(table, key, &predicate)?;
        report.features = compute_features(table, GroupKey::SegmentId, true);

        report.output_points = table.len();
        info!(
            "[Pipeline] Done: {} -> {} points in {} segments",
            report.input_points, report.output_points, report.segmentation.segments
        );
        Ok(report)
    }

    /// Repair and interpolate a map-matched table in place, then validate it.
    pub fn run_map_matched(&self, table: &mut TrajectoryTable) -> Result<MapMatchReport> {
        self.config.validate()?;
        let bounds = &self.config.map_matching;
        info!("[Pipeline] Map-matched run with {} points", table.len());

        let repair = fix_time_not_in_ascending_order(table, bounds.key, bounds.drop_deleted)?;
        let interpolation = interpolate_node_times(table, bounds.key, bounds)?;
        check_time_dist(table, bounds.key, bounds)?;

        Ok(MapMatchReport {
            repair,
            interpolation,
        })
    }
}
