//! Iterative cleaning passes.
//!
//! Every policy has the same shape: recompute features, find the rows that
//! break a rule, drop them, and repeat until a pass finds nothing. The loop is
//! bounded: each pass that finds violations removes at least one row, so a
//! table of `n` rows settles within `n + 1` passes, and `max_iterations` is a
//! hard cap on top of that.
//!
//! ## Policies
//! - GPS jumps: a point far out of line with both neighbors
//! - Nearby points: points too close (or too slow) to their predecessor
//! - Speed ceiling: edges faster than a maximum speed
//! - Short trajectories: groups with too few points or too little distance

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, TrajectoryError};
use crate::features::{compute_distance_features, compute_features};
use crate::{GroupKey, TrajectoryPoint, TrajectoryTable};

/// Outcome of a cleaning policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    /// Passes run, including the final pass that found no violations
    pub iterations: usize,
    /// Rows removed across all passes
    pub rows_dropped: usize,
}

/// Run `pass` until it drops nothing.
///
/// `pass` recomputes whatever it needs and returns the number of rows it
/// removed. Fails with [`TrajectoryError::NonConvergence`] if the table is
/// still changing after `max_iterations` passes.
pub fn run_to_fixed_point<F>(
    table: &mut TrajectoryTable,
    operation: &'static str,
    max_iterations: usize,
    mut pass: F,
) -> Result<CleaningReport>
where
    F: FnMut(&mut TrajectoryTable) -> usize,
{
    let mut report = CleaningReport::default();
    while report.iterations < max_iterations {
        report.iterations += 1;
        let before = table.len();
        let dropped = pass(table);
        if dropped == 0 {
            info!(
                "[Cleaning] {}: dropped {} rows in {} passes, {} remain",
                operation,
                report.rows_dropped,
                report.iterations,
                table.len()
            );
            return Ok(report);
        }
        report.rows_dropped += dropped;
        debug!(
            "[Cleaning] {} pass {}: rows before {}, after {}",
            operation,
            report.iterations,
            before,
            table.len()
        );
    }
    Err(TrajectoryError::NonConvergence {
        operation,
        iterations: max_iterations,
    })
}

// ============================================================================
// GPS jumps
// ============================================================================

/// Whether a point is a jump given its distance features.
///
/// A jump is farther than `threshold` from both neighbors (which are also more
/// than `threshold` apart) and `coefficient` times farther from each neighbor
/// than the neighbors are from each other.
pub fn is_jump(point: &TrajectoryPoint, threshold: f64, coefficient: f64) -> bool {
    point.dist_to_next > threshold
        && point.dist_to_prev > threshold
        && point.dist_prev_to_next > threshold
        && coefficient * point.dist_prev_to_next < point.dist_to_next
        && coefficient * point.dist_prev_to_next < point.dist_to_prev
}

/// Mark every jump in the table using its current distance features.
///
/// Does not modify the table. The returned mask is indexed by row.
pub fn filter_jumps(table: &TrajectoryTable, threshold: f64, coefficient: f64) -> Vec<bool> {
    table
        .points()
        .iter()
        .map(|p| is_jump(p, threshold, coefficient))
        .collect()
}

/// Remove GPS jumps until none remain.
///
/// All jumps found in a pass are removed together; adjacent jumps are
/// therefore judged against the same, unmodified neighbors.
pub fn clean_gps_jumps_by_distance(
    table: &mut TrajectoryTable,
    key: GroupKey,
    threshold: f64,
    coefficient: f64,
    max_iterations: usize,
) -> Result<CleaningReport> {
    run_to_fixed_point(table, "gps jumps", max_iterations, |t| {
        compute_distance_features(t, key, true);
        let jumps = filter_jumps(t, threshold, coefficient);
        t.drop_marked(&jumps)
    })
}

// ============================================================================
// Nearby points
// ============================================================================

/// Remove points within `radius` meters of their predecessor until none remain.
pub fn clean_gps_nearby_points_by_distances(
    table: &mut TrajectoryTable,
    key: GroupKey,
    radius: f64,
    max_iterations: usize,
) -> Result<CleaningReport> {
    run_to_fixed_point(table, "nearby points by distance", max_iterations, |t| {
        compute_distance_features(t, key, true);
        t.retain(|p| p.dist_to_prev > radius || p.dist_to_prev.is_nan())
    })
}

/// Remove points moving at most `radius` m/s from their predecessor until none remain.
pub fn clean_gps_nearby_points_by_speed(
    table: &mut TrajectoryTable,
    key: GroupKey,
    radius: f64,
    max_iterations: usize,
) -> Result<CleaningReport> {
    run_to_fixed_point(table, "nearby points by speed", max_iterations, |t| {
        compute_features(t, key, true);
        t.retain(|p| p.speed_to_prev > radius || p.speed_to_prev.is_nan())
    })
}

// ============================================================================
// Speed ceiling
// ============================================================================

/// Rows to drop for edges faster than `max_speed`, one row per fast edge.
///
/// Both endpoints of a fast edge exceed the ceiling (one through
/// `speed_to_next`, the other through `speed_to_prev`); only one is removed.
/// Edges are visited left to right:
/// - an edge whose departure point is already marked is skipped;
/// - on a group's first edge, the departure point is the outlier when the
///   arrival point's own outgoing edge exists and is plausible;
/// - otherwise the arrival point is removed, so in a two-point group the
///   point reached too fast goes.
fn speed_outliers(table: &TrajectoryTable, key: GroupKey, max_speed: f64) -> Vec<bool> {
    let points = table.points();
    let fast = |speed: f64| speed > max_speed;
    let mut marked = vec![false; points.len()];
    for rows in table.group_indices(key) {
        for k in 1..rows.len() {
            let (from, to) = (rows[k - 1], rows[k]);
            if marked[from] || !fast(points[to].speed_to_prev) {
                continue;
            }
            let departure_is_outlier = k == 1 && points[to].speed_to_next <= max_speed;
            if departure_is_outlier {
                marked[from] = true;
            } else {
                marked[to] = true;
            }
        }
    }
    marked
}

/// Remove points on edges faster than `max_speed` m/s until none remain.
///
/// A point is a candidate when its `speed_to_prev` or `speed_to_next` exceeds
/// the ceiling; each fast edge costs exactly one point per pass, so a single
/// spike in the middle of a trajectory removes one row.
pub fn clean_gps_speed_max_radius(
    table: &mut TrajectoryTable,
    key: GroupKey,
    max_speed: f64,
    max_iterations: usize,
) -> Result<CleaningReport> {
    run_to_fixed_point(table, "speed ceiling", max_iterations, |t| {
        compute_features(t, key, true);
        let marked = speed_outliers(t, key, max_speed);
        t.drop_marked(&marked)
    })
}

// ============================================================================
// Whole trajectories
// ============================================================================

/// Drop groups with fewer than `min_points` points, then refresh features.
///
/// Single pass. Returns the number of rows removed.
pub fn clean_traj_with_few_points(
    table: &mut TrajectoryTable,
    key: GroupKey,
    min_points: usize,
) -> usize {
    let groups = table.group_indices(key);
    let few: Vec<usize> = groups
        .iter()
        .enumerate()
        .filter(|(_, rows)| rows.len() < min_points)
        .map(|(g, _)| g)
        .collect();
    if few.is_empty() {
        return 0;
    }
    let dropped = table.drop_groups(&groups, &few);
    info!(
        "[Cleaning] {} of {} groups had fewer than {} points ({} rows)",
        few.len(),
        groups.len(),
        min_points,
        dropped
    );
    compute_features(table, key, true);
    dropped
}

/// Sum of a per-point value over each group, treating undefined values as zero.
fn group_sums<F>(table: &TrajectoryTable, groups: &[Vec<usize>], value: F) -> Vec<f64>
where
    F: Fn(&TrajectoryPoint) -> f64,
{
    let points = table.points();
    groups
        .iter()
        .map(|rows| {
            rows.iter()
                .map(|&i| value(&points[i]))
                .filter(|v| !v.is_nan())
                .sum()
        })
        .collect()
}

/// Remove trajectories with too few points or too little total distance.
///
/// Each pass drops groups with fewer than `min_points` points, recomputes
/// features, then drops groups whose summed `dist_to_prev` is below
/// `min_distance` meters.
pub fn clean_traj_short_and_few_points(
    table: &mut TrajectoryTable,
    key: GroupKey,
    min_points: usize,
    min_distance: f64,
    max_iterations: usize,
) -> Result<CleaningReport> {
    run_to_fixed_point(table, "short trajectories", max_iterations, |t| {
        let few = clean_traj_with_few_points(t, key, min_points);
        compute_features(t, key, true);

        let groups = t.group_indices(key);
        let distances = group_sums(t, &groups, |p| p.dist_to_prev);
        let short: Vec<usize> = distances
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d < min_distance)
            .map(|(g, _)| g)
            .collect();
        debug!(
            "[Cleaning] {} of {} groups shorter than {} m",
            short.len(),
            groups.len(),
            min_distance
        );
        few + t.drop_groups(&groups, &short)
    })
}

/// Drop groups whose total elapsed time is below `time_max` seconds.
///
/// Uses the current `time_to_prev` features. Returns the number of rows removed.
pub fn clean_id_by_time_max(table: &mut TrajectoryTable, key: GroupKey, time_max: f64) -> usize {
    let groups = table.group_indices(key);
    let durations = group_sums(table, &groups, |p| p.time_to_prev);
    let brief: Vec<usize> = durations
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d < time_max)
        .map(|(g, _)| g)
        .collect();
    let dropped = table.drop_groups(&groups, &brief);
    info!(
        "[Cleaning] {} of {} groups last less than {} s ({} rows)",
        brief.len(),
        groups.len(),
        time_max,
        dropped
    );
    dropped
}

// ============================================================================
// Duplicates and invalid rows
// ============================================================================

/// Fields compared when looking for duplicate rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateSubset {
    /// Latitude and longitude
    Location,
    /// Object id, latitude and longitude
    ObjectLocation,
    /// Object id, latitude, longitude and timestamp
    ObjectLocationTime,
}

#[derive(PartialEq, Eq, Hash)]
struct DuplicateKey<'a> {
    object_id: Option<&'a str>,
    lat: u64,
    lon: u64,
    timestamp: Option<i64>,
}

impl DuplicateSubset {
    fn key<'a>(&self, p: &'a TrajectoryPoint) -> DuplicateKey<'a> {
        let (object_id, timestamp) = match self {
            DuplicateSubset::Location => (None, None),
            DuplicateSubset::ObjectLocation => (Some(p.object_id.as_str()), None),
            DuplicateSubset::ObjectLocationTime => (Some(p.object_id.as_str()), Some(p.timestamp)),
        };
        DuplicateKey {
            object_id,
            lat: p.lat.to_bits(),
            lon: p.lon.to_bits(),
            timestamp,
        }
    }
}

/// Remove rows repeating an earlier row on `subset`, keeping the first.
///
/// With `sort`, the table is first ordered by object id and timestamp.
pub fn clean_duplicates(table: &mut TrajectoryTable, subset: DuplicateSubset, sort: bool) -> usize {
    if sort {
        table.sort_by_key_and_time(GroupKey::ObjectId);
    }
    let marked: Vec<bool> = {
        let mut seen = HashSet::new();
        table
            .points()
            .iter()
            .map(|p| !seen.insert(subset.key(p)))
            .collect()
    };
    let dropped = table.drop_marked(&marked);
    info!("[Cleaning] {} duplicated points removed", dropped);
    dropped
}

/// Remove rows equal on `subset` to the row right before them.
pub fn clean_consecutive_duplicates(table: &mut TrajectoryTable, subset: DuplicateSubset) -> usize {
    let marked: Vec<bool> = {
        let points = table.points();
        let mut marked = vec![false; points.len()];
        for i in 1..points.len() {
            marked[i] = subset.key(&points[i]) == subset.key(&points[i - 1]);
        }
        marked
    };
    let dropped = table.drop_marked(&marked);
    debug!("[Cleaning] {} consecutive duplicates removed", dropped);
    dropped
}

/// Remove rows with missing or out-of-range coordinates.
pub fn clean_invalid_points(table: &mut TrajectoryTable) -> usize {
    let dropped = table.retain(TrajectoryPoint::is_valid);
    if dropped > 0 {
        info!("[Cleaning] {} points with invalid coordinates removed", dropped);
    }
    dropped
}
