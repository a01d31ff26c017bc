//! Threshold-based trajectory segmentation.
//!
//! A group is split wherever the edge arriving at a point violates a
//! [`SplitPredicate`]. The violating point opens the new segment. Segment ids
//! come from one counter shared by the whole table, so they are unique and
//! increase in the order segments are created.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::SegmentationConfig;
use crate::error::{Result, TrajectoryError};
use crate::{GroupKey, Situation, TrajectoryPoint, TrajectoryTable};

/// Thresholds on the edge from the previous point.
///
/// A point violates the predicate when any configured threshold is exceeded.
/// Undefined features never violate it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitPredicate {
    /// Split when `dist_to_prev` exceeds this (meters)
    pub max_dist: Option<f64>,
    /// Split when `time_to_prev` exceeds this (seconds)
    pub max_time: Option<f64>,
    /// Split when `speed_to_prev` exceeds this (m/s)
    pub max_speed: Option<f64>,
}

impl SplitPredicate {
    pub fn by_distance(max_dist: f64) -> Self {
        Self {
            max_dist: Some(max_dist),
            ..Self::default()
        }
    }

    pub fn by_time(max_time: f64) -> Self {
        Self {
            max_time: Some(max_time),
            ..Self::default()
        }
    }

    pub fn by_speed(max_speed: f64) -> Self {
        Self {
            max_speed: Some(max_speed),
            ..Self::default()
        }
    }

    pub fn from_config(config: &SegmentationConfig) -> Self {
        Self {
            max_dist: config.max_dist_between_adj_points,
            max_time: config.max_time_between_adj_points,
            max_speed: config.max_speed_between_adj_points,
        }
    }

    /// True when no threshold is configured.
    pub fn is_empty(&self) -> bool {
        self.max_dist.is_none() && self.max_time.is_none() && self.max_speed.is_none()
    }

    /// Whether the edge arriving at `point` violates any threshold.
    pub fn violated_by(&self, point: &TrajectoryPoint) -> bool {
        self.max_dist.is_some_and(|d| point.dist_to_prev > d)
            || self.max_time.is_some_and(|t| point.time_to_prev > t)
            || self.max_speed.is_some_and(|s| point.speed_to_prev > s)
    }
}

/// Outcome of a segmentation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentationReport {
    /// Number of input groups
    pub groups: usize,
    /// Number of segments created
    pub segments: usize,
    /// Groups with a single point, which cannot be split
    pub non_splittable_groups: Vec<String>,
}

/// Walk each group in timestamp order and yield its rows split at violations.
///
/// Groups come in ascending order of their key value.
fn split_runs(
    table: &TrajectoryTable,
    key: GroupKey,
    predicate: &SplitPredicate,
) -> Vec<Vec<Vec<usize>>> {
    let points = table.points();
    let mut groups = table.group_indices(key);
    groups.sort_by(|a, b| key.value(&points[a[0]]).cmp(&key.value(&points[b[0]])));
    groups
        .into_iter()
        .map(|mut rows| {
            rows.sort_by_key(|&i| points[i].timestamp);
            let mut runs: Vec<Vec<usize>> = Vec::new();
            for (j, &i) in rows.iter().enumerate() {
                if j == 0 || predicate.violated_by(&points[i]) {
                    runs.push(Vec::new());
                }
                if let Some(run) = runs.last_mut() {
                    run.push(i);
                }
            }
            runs
        })
        .collect()
}

/// Assign a new `segment_id` to every point.
///
/// Expects features from [`crate::features::compute_features`]. Groups are
/// visited in ascending order of their key value, each in timestamp order,
/// and ids start at 1. The table's row order is not changed. Features must be recomputed by
/// [`GroupKey::SegmentId`] afterward if per-segment values are needed.
///
/// # Example
/// ```
/// use trajprep::{GroupKey, TrajectoryPoint, TrajectoryTable};
/// use trajprep::features::compute_features;
/// use trajprep::segmentation::{segment_trajectories, SplitPredicate};
///
/// let mut table = TrajectoryTable::new(vec![
///     TrajectoryPoint::new("a", 0.0, 0.0, 0),
///     TrajectoryPoint::new("a", 0.0, 0.001, 60_000),
///     TrajectoryPoint::new("a", 0.0, 0.5, 120_000),
/// ]);
/// compute_features(&mut table, GroupKey::ObjectId, true);
/// let predicate = SplitPredicate::by_distance(3000.0);
/// segment_trajectories(&mut table, GroupKey::ObjectId, &predicate).unwrap();
/// let ids: Vec<_> = table.points().iter().map(|p| p.segment_id.unwrap()).collect();
/// assert_eq!(ids, vec![1, 1, 2]);
/// ```
pub fn segment_trajectories(
    table: &mut TrajectoryTable,
    key: GroupKey,
    predicate: &SplitPredicate,
) -> Result<SegmentationReport> {
    if predicate.is_empty() {
        return Err(TrajectoryError::InvalidConfig(
            "segmentation predicate has no threshold".to_string(),
        ));
    }
    debug!("[Segmentation] Splitting by {} with {:?}", key, predicate);

    let groups = split_runs(table, key, predicate);
    let mut report = SegmentationReport {
        groups: groups.len(),
        ..SegmentationReport::default()
    };

    for runs in &groups {
        if let [run] = runs.as_slice() {
            if run.len() == 1 {
                let label = table.group_label(key, run[0]);
                warn!("[Segmentation] {} '{}' has a single point to split", key, label);
                report.non_splittable_groups.push(label);
            }
        }
    }

    let mut next_segment_id: u64 = 0;
    let points = table.points_mut();
    for runs in groups {
        for run in runs {
            next_segment_id += 1;
            for i in run {
                points[i].segment_id = Some(next_segment_id);
            }
        }
    }
    report.segments = next_segment_id as usize;

    info!(
        "[Segmentation] {} groups split into {} segments",
        report.groups, report.segments
    );
    Ok(report)
}

/// Split where `dist_to_prev` exceeds `max_dist` meters.
pub fn segment_by_max_dist(
    table: &mut TrajectoryTable,
    key: GroupKey,
    max_dist: f64,
) -> Result<SegmentationReport> {
    segment_trajectories(table, key, &SplitPredicate::by_distance(max_dist))
}

/// Split where `time_to_prev` exceeds `max_time` seconds.
pub fn segment_by_max_time(
    table: &mut TrajectoryTable,
    key: GroupKey,
    max_time: f64,
) -> Result<SegmentationReport> {
    segment_trajectories(table, key, &SplitPredicate::by_time(max_time))
}

/// Split where `speed_to_prev` exceeds `max_speed` m/s.
pub fn segment_by_max_speed(
    table: &mut TrajectoryTable,
    key: GroupKey,
    max_speed: f64,
) -> Result<SegmentationReport> {
    segment_trajectories(table, key, &SplitPredicate::by_speed(max_speed))
}

/// Split where any of the distance, time or speed thresholds is exceeded.
pub fn segment_by_dist_time_speed(
    table: &mut TrajectoryTable,
    key: GroupKey,
    max_dist: f64,
    max_time: f64,
    max_speed: f64,
) -> Result<SegmentationReport> {
    let predicate = SplitPredicate {
        max_dist: Some(max_dist),
        max_time: Some(max_time),
        max_speed: Some(max_speed),
    };
    segment_trajectories(table, key, &predicate)
}

/// Tag points as `Stop` when they belong to a dwell run.
///
/// Each group is cut wherever `dist_to_prev` exceeds `dist_radius`; a run
/// lasting longer than `time_radius` seconds is a stop, every other point
/// moves. Every point also gets the id of its run in `stop_segment` (from 1,
/// unique across the table), which [`compress_stops`] works from. Existing
/// `segment_id`s are left untouched. Returns the number of points tagged `Stop`.
pub fn detect_stops_by_dist_time(
    table: &mut TrajectoryTable,
    key: GroupKey,
    dist_radius: f64,
    time_radius: f64,
) -> usize {
    let groups = split_runs(table, key, &SplitPredicate::by_distance(dist_radius));
    let points = table.points_mut();
    let mut stops = 0;
    let mut run_id: u64 = 0;
    for run in groups.into_iter().flatten() {
        run_id += 1;
        let (first, last) = (run[0], run[run.len() - 1]);
        let duration = points[last].time_seconds() - points[first].time_seconds();
        let situation = if duration > time_radius {
            stops += run.len();
            Situation::Stop
        } else {
            Situation::Move
        };
        for i in run {
            points[i].situation = Some(situation);
            points[i].stop_segment = Some(run_id);
        }
    }
    info!(
        "[Segmentation] {} stop points in {} runs (radius {} m, {} s)",
        stops, run_id, dist_radius, time_radius
    );
    stops
}

// ============================================================================
// Stop compression
// ============================================================================

/// Position a compressed stop is reduced to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPoint {
    /// The position recorded most often in the stop; ties go to the earliest
    #[default]
    Mode,
    /// Mean latitude and longitude of the stop
    Centroid,
}

/// Outcome of [`compress_stops`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopCompressionReport {
    /// Stop runs reduced to their first and last point
    pub stops_compressed: usize,
    /// Stop runs with a single point, left unchanged
    pub single_point_stops: usize,
    pub rows_dropped: usize,
}

fn representative(points: &[TrajectoryPoint], rows: &[usize], point: StopPoint) -> (f64, f64) {
    match point {
        StopPoint::Mode => {
            let mut counts: HashMap<(u64, u64), usize> = HashMap::new();
            for &i in rows {
                *counts
                    .entry((points[i].lat.to_bits(), points[i].lon.to_bits()))
                    .or_insert(0) += 1;
            }
            let mut best = (points[rows[0]].lat, points[rows[0]].lon, 0);
            for &i in rows {
                let count = counts[&(points[i].lat.to_bits(), points[i].lon.to_bits())];
                if count > best.2 {
                    best = (points[i].lat, points[i].lon, count);
                }
            }
            (best.0, best.1)
        }
        StopPoint::Centroid => {
            let n = rows.len() as f64;
            let lat = rows.iter().map(|&i| points[i].lat).sum::<f64>() / n;
            let lon = rows.iter().map(|&i| points[i].lon).sum::<f64>() / n;
            (lat, lon)
        }
    }
}

/// Collapse every stop run from [`detect_stops_by_dist_time`] to one position.
///
/// A stop run keeps only its first and last point (by timestamp), both moved
/// to the run's representative position, so the dwell's start and end times
/// survive. Points not in a stop run are moves; with `drop_moves` they are
/// removed. Features are left stale and must be recomputed.
pub fn compress_stops(
    table: &mut TrajectoryTable,
    point: StopPoint,
    drop_moves: bool,
) -> StopCompressionReport {
    let runs = table.group_by(|p| p.stop_segment);
    let mut report = StopCompressionReport::default();
    let mut marked = vec![false; table.len()];
    let mut moved: Vec<(usize, (f64, f64))> = Vec::new();

    let points = table.points();
    for mut rows in runs {
        let is_stop = rows.iter().all(|&i| {
            points[i].stop_segment.is_some() && points[i].situation == Some(Situation::Stop)
        });
        if !is_stop {
            if drop_moves {
                for i in rows {
                    marked[i] = true;
                }
            }
            continue;
        }
        if rows.len() == 1 {
            report.single_point_stops += 1;
            continue;
        }

        rows.sort_by_key(|&i| points[i].timestamp);
        let position = representative(points, &rows, point);
        let (first, last) = (rows[0], rows[rows.len() - 1]);
        moved.push((first, position));
        moved.push((last, position));
        for &i in &rows[1..rows.len() - 1] {
            marked[i] = true;
        }
        report.stops_compressed += 1;
    }

    let points = table.points_mut();
    for (i, (lat, lon)) in moved {
        points[i].lat = lat;
        points[i].lon = lon;
    }
    report.rows_dropped = table.drop_marked(&marked);

    if report.single_point_stops > 0 {
        warn!(
            "[Segmentation] {} stop runs have a single point",
            report.single_point_stops
        );
    }
    info!(
        "[Segmentation] Compressed {} stops ({:?}), {} rows dropped",
        report.stops_compressed, point, report.rows_dropped
    );
    report
}
