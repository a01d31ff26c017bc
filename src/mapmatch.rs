//! Map-matching repair and node time interpolation.
//!
//! After GPS samples are snapped onto a road network, each trajectory holds
//! two kinds of rows: observed samples with a trusted timestamp and a
//! `distance_along_path`, and network nodes with a distance but no time.
//!
//! 1. [`fix_time_not_in_ascending_order`] orders every group by distance and
//!    soft-deletes observed samples that would make time go backwards.
//! 2. [`interpolate_node_times`] fits time as a piecewise-linear function of
//!    distance through the observed samples and evaluates it at every node.
//! 3. [`check_time_dist`] validates the result without modifying anything.
//!
//! Groups are independent: with the `parallel` feature they are processed on
//! rayon's pool and the results are written back sequentially.

use log::{debug, info, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::config::MapMatchConfig;
use crate::error::{OptionExt, Result, TrajectoryError};
use crate::features::speed;
use crate::{GroupKey, TrajectoryPoint, TrajectoryTable};

/// Outcome of [`fix_time_not_in_ascending_order`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Groups examined
    pub groups: usize,
    /// Rows removed as duplicates of (key, is_node, distance_along_path)
    pub duplicates_dropped: usize,
    /// Rows marked deleted, including every row of fully deleted groups
    pub points_deleted: usize,
    /// Groups left with at most one usable observed point
    pub groups_deleted: Vec<String>,
    /// Rows physically removed after marking
    pub rows_dropped: usize,
}

/// Outcome of [`interpolate_node_times`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterpolationReport {
    /// Groups examined
    pub groups: usize,
    /// Nodes that received a timestamp
    pub nodes_interpolated: usize,
    /// Groups removed for having fewer than two distinct observed points
    pub dropped_groups: Vec<String>,
    /// Rows removed with those groups
    pub rows_dropped: usize,
}

/// Piecewise-linear function through `(x, y)` samples, extended linearly
/// past both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearInterpolant {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl LinearInterpolant {
    /// Build from samples with strictly increasing `x`.
    ///
    /// Needs at least two samples; `group` only labels the error.
    pub fn new(x: Vec<f64>, y: Vec<f64>, group: &str) -> Result<Self> {
        let count = x.len().min(y.len());
        (count >= 2).then_some(()).ok_or_insufficient_points(group, count, 2)?;
        if let Some(k) = first_unordered(&x, true) {
            return Err(TrajectoryError::precondition(
                group,
                k,
                "interpolation distances must be strictly increasing",
            ));
        }
        Ok(Self { x, y })
    }

    /// Evaluate at `q`. Outside the sampled range the first or last segment
    /// is extended.
    pub fn eval(&self, q: f64) -> f64 {
        let n = self.x.len();
        let k = self.x.partition_point(|&xi| xi <= q).clamp(1, n - 1);
        let (x0, x1) = (self.x[k - 1], self.x[k]);
        let (y0, y1) = (self.y[k - 1], self.y[k]);
        y0 + (q - x0) * (y1 - y0) / (x1 - x0)
    }
}

/// Observed (non-node, non-deleted) rows of a group, in group order.
fn observed_rows(points: &[TrajectoryPoint], rows: &[usize]) -> Vec<usize> {
    rows.iter()
        .copied()
        .filter(|&i| !points[i].is_node && !points[i].deleted)
        .collect()
}

/// First index where `values` stops ascending. With `strict`, equal
/// neighbors count as unordered. Any `NaN` is unordered.
fn first_unordered(values: &[f64], strict: bool) -> Option<usize> {
    (1..values.len()).find(|&k| match values[k - 1].partial_cmp(&values[k]) {
        Some(Ordering::Less) => false,
        Some(Ordering::Equal) => strict,
        _ => true,
    })
}

/// Fail on the first position where `values` decreases (or is undefined).
fn ensure_non_decreasing(group: &str, values: &[f64], what: &str) -> Result<()> {
    match first_unordered(values, false) {
        Some(k) => Err(TrajectoryError::precondition(
            group,
            k,
            format!("{} is not in ascending order", what),
        )),
        None => Ok(()),
    }
}

fn ensure_increasing(group: &str, values: &[f64], what: &str) -> Result<()> {
    match first_unordered(values, true) {
        Some(k) => Err(TrajectoryError::precondition(
            group,
            k,
            format!("{} is not strictly ascending", what),
        )),
        None => Ok(()),
    }
}

/// Check adjacent observed deltas against the plausibility ceilings.
///
/// `distances` in meters, `times` in milliseconds.
fn check_deltas(
    group: &str,
    distances: &[f64],
    times: &[f64],
    bounds: &MapMatchConfig,
) -> Result<()> {
    for k in 1..distances.len() {
        let delta_time = (times[k] - times[k - 1]) / 1000.0;
        let delta_dist = distances[k] - distances[k - 1];
        if delta_time > bounds.max_time_between_adj_points {
            return Err(TrajectoryError::plausibility(
                group,
                k,
                "delta_time",
                delta_time,
                bounds.max_time_between_adj_points,
            ));
        }
        if delta_dist > bounds.max_dist_between_adj_points {
            return Err(TrajectoryError::plausibility(
                group,
                k,
                "delta_dist",
                delta_dist,
                bounds.max_dist_between_adj_points,
            ));
        }
        let edge_speed = delta_dist / delta_time;
        if edge_speed > bounds.max_speed {
            return Err(TrajectoryError::plausibility(
                group,
                k,
                "speed",
                edge_speed,
                bounds.max_speed,
            ));
        }
    }
    Ok(())
}

// ============================================================================
// Ordering repair
// ============================================================================

/// Rows to mark deleted in one group. `Ok(None)` means the whole group goes.
fn repair_group(
    points: &[TrajectoryPoint],
    rows: &[usize],
    group: &str,
) -> Result<Option<Vec<usize>>> {
    let observed = observed_rows(points, rows);
    let distances: Vec<f64> = observed.iter().map(|&i| points[i].distance_along_path).collect();
    ensure_non_decreasing(group, &distances, "distance_along_path")?;

    // Deleting the first offender and rescanning keeps exactly the samples
    // whose time exceeds that of the last kept sample.
    let mut deleted = Vec::new();
    let mut last_kept: Option<i64> = None;
    for &i in &observed {
        let t = points[i].timestamp;
        match last_kept {
            Some(prev) if prev >= t => deleted.push(i),
            _ => last_kept = Some(t),
        }
    }

    if observed.len() - deleted.len() <= 1 {
        return Ok(None);
    }
    Ok(Some(deleted))
}

/// Enforce strictly increasing time along distance for observed samples.
///
/// Steps:
/// 1. drop rows duplicating an earlier (key, is_node, distance_along_path);
/// 2. sort by (key, distance_along_path) and clear every `deleted` flag;
/// 3. per group, mark observed samples deleted until time strictly increases
///    along the remaining ones (the first offender goes each time);
/// 4. a group left with at most one observed sample is deleted entirely;
/// 5. with `drop_deleted`, remove marked rows from the table.
///
/// Fails with [`TrajectoryError::PreconditionViolation`] if observed distances
/// decrease or are undefined after sorting. The table is not modified past
/// step 2 in that case.
pub fn fix_time_not_in_ascending_order(
    table: &mut TrajectoryTable,
    key: GroupKey,
    drop_deleted: bool,
) -> Result<RepairReport> {
    let duplicates: Vec<bool> = {
        let mut seen = HashSet::new();
        table
            .points()
            .iter()
            .map(|p| !seen.insert((key.value(p), p.is_node, p.distance_along_path.to_bits())))
            .collect()
    };
    let mut report = RepairReport {
        duplicates_dropped: table.drop_marked(&duplicates),
        ..RepairReport::default()
    };
    debug!("[MapMatch] Dropped {} duplicate distances", report.duplicates_dropped);

    table.sort_by_key_and_distance(key);
    for p in table.points_mut() {
        p.deleted = false;
    }

    let groups = table.group_indices(key);
    let points = table.points();
    let labels: Vec<String> = groups.iter().map(|rows| table.group_label(key, rows[0])).collect();

    #[cfg(feature = "parallel")]
    let outcomes: Result<Vec<Option<Vec<usize>>>> = groups
        .par_iter()
        .zip(labels.par_iter())
        .map(|(rows, label)| repair_group(points, rows, label))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes: Result<Vec<Option<Vec<usize>>>> = groups
        .iter()
        .zip(&labels)
        .map(|(rows, label)| repair_group(points, rows, label))
        .collect();
    let outcomes = outcomes?;

    report.groups = groups.len();
    let points = table.points_mut();
    for ((rows, label), outcome) in groups.iter().zip(labels).zip(outcomes) {
        let marked = match outcome {
            Some(deleted) => deleted,
            None => {
                warn!("[MapMatch] {} '{}' has at most one usable point, deleting", key, label);
                report.groups_deleted.push(label);
                rows.clone()
            }
        };
        for i in marked {
            points[i].deleted = true;
            report.points_deleted += 1;
        }
    }

    if drop_deleted && report.points_deleted > 0 {
        report.rows_dropped = table.retain(|p| !p.deleted);
    }

    info!(
        "[MapMatch] {} rows marked deleted in {} groups ({} groups fully deleted, {} rows dropped)",
        report.points_deleted,
        report.groups,
        report.groups_deleted.len(),
        report.rows_dropped
    );
    Ok(report)
}

// ============================================================================
// Node time interpolation
// ============================================================================

/// Values computed for one node row.
struct NodeTime {
    row: usize,
    timestamp: i64,
    delta_time: f64,
    speed: f64,
}

enum GroupTimes {
    Interpolated(Vec<NodeTime>),
    /// Not enough distinct observed samples; the group is removed
    Insufficient,
}

fn interpolate_group(
    points: &[TrajectoryPoint],
    rows: &[usize],
    group: &str,
    bounds: &MapMatchConfig,
) -> Result<GroupTimes> {
    let observed = observed_rows(points, rows);
    if observed.len() < 2 {
        return Ok(GroupTimes::Insufficient);
    }

    let mut x: Vec<f64> = observed.iter().map(|&i| points[i].distance_along_path).collect();
    let mut y: Vec<f64> = observed.iter().map(|&i| points[i].timestamp as f64).collect();
    ensure_non_decreasing(group, &y, "time")?;
    ensure_non_decreasing(group, &x, "distance_along_path")?;

    // Equal distances would make the interpolant divide by zero; the last
    // sample of each run of equal distances is kept.
    let keep: Vec<bool> = (0..x.len()).map(|k| k + 1 == x.len() || x[k + 1] != x[k]).collect();
    let mut flags = keep.iter();
    x.retain(|_| *flags.next().unwrap_or(&true));
    let mut flags = keep.iter();
    y.retain(|_| *flags.next().unwrap_or(&true));
    if x.len() < 2 {
        return Ok(GroupTimes::Insufficient);
    }

    check_deltas(group, &x, &y, bounds)?;
    let interpolant = LinearInterpolant::new(x, y, group)?;

    let nodes: Vec<usize> = rows
        .iter()
        .copied()
        .filter(|&i| points[i].is_node && !points[i].deleted)
        .collect();
    let node_distances: Vec<f64> = nodes.iter().map(|&i| points[i].distance_along_path).collect();
    ensure_non_decreasing(group, &node_distances, "node distance_along_path")?;

    let estimates: Vec<f64> = node_distances.iter().map(|&d| interpolant.eval(d)).collect();
    if let Some(k) = estimates.iter().position(|t| !t.is_finite()) {
        return Err(TrajectoryError::precondition(group, k, "interpolated node time is not finite"));
    }
    ensure_non_decreasing(group, &estimates, "interpolated node time")?;

    let timestamps: Vec<i64> = estimates.iter().map(|&t| t as i64).collect();
    let times = nodes
        .iter()
        .enumerate()
        .map(|(k, &row)| {
            let delta_time = match timestamps.get(k + 1) {
                Some(&next) => (next - timestamps[k]) as f64 / 1000.0,
                None => f64::NAN,
            };
            NodeTime {
                row,
                timestamp: timestamps[k],
                delta_time,
                speed: speed(points[row].edge_distance, delta_time),
            }
        })
        .collect();
    Ok(GroupTimes::Interpolated(times))
}

/// Assign timestamps to network nodes from the observed samples around them.
///
/// Per group, observed samples (non-node, non-deleted) must be ascending in
/// time and distance. Samples sharing a distance are reduced to one. Adjacent
/// samples are checked against the plausibility ceilings in `bounds`. Node
/// times come from linear interpolation of time over distance, extended
/// linearly before the first and after the last sample, truncated to whole
/// milliseconds. Each node also gets `delta_time` (seconds to the next node of
/// its group) and `speed = edge_distance / delta_time`; both are `NaN` for
/// the last node and for non-node rows.
///
/// Groups with fewer than two distinct observed samples are removed at the
/// end. Every group is validated before the table is written, so an error
/// leaves the table unchanged.
pub fn interpolate_node_times(
    table: &mut TrajectoryTable,
    key: GroupKey,
    bounds: &MapMatchConfig,
) -> Result<InterpolationReport> {
    let groups = table.group_indices(key);
    let points = table.points();
    let labels: Vec<String> = groups.iter().map(|rows| table.group_label(key, rows[0])).collect();

    #[cfg(feature = "parallel")]
    let outcomes: Result<Vec<GroupTimes>> = groups
        .par_iter()
        .zip(labels.par_iter())
        .map(|(rows, label)| interpolate_group(points, rows, label, bounds))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes: Result<Vec<GroupTimes>> = groups
        .iter()
        .zip(&labels)
        .map(|(rows, label)| interpolate_group(points, rows, label, bounds))
        .collect();
    let outcomes = outcomes?;

    let mut report = InterpolationReport {
        groups: groups.len(),
        ..InterpolationReport::default()
    };
    let mut insufficient = Vec::new();

    let points = table.points_mut();
    for p in points.iter_mut() {
        p.delta_time = f64::NAN;
        p.speed = f64::NAN;
    }
    for (g, (label, outcome)) in labels.into_iter().zip(outcomes).enumerate() {
        match outcome {
            GroupTimes::Interpolated(nodes) => {
                report.nodes_interpolated += nodes.len();
                for node in nodes {
                    let p = &mut points[node.row];
                    p.timestamp = node.timestamp;
                    p.delta_time = node.delta_time;
                    p.speed = node.speed;
                }
            }
            GroupTimes::Insufficient => {
                insufficient.push(g);
                report.dropped_groups.push(label);
            }
        }
    }

    if !insufficient.is_empty() {
        warn!(
            "[MapMatch] {} groups have fewer than two observed points, dropping",
            insufficient.len()
        );
        report.rows_dropped = table.drop_groups(&groups, &insufficient);
    }

    info!(
        "[MapMatch] Interpolated {} nodes in {} groups ({} groups, {} rows dropped)",
        report.nodes_interpolated,
        report.groups,
        report.dropped_groups.len(),
        report.rows_dropped
    );
    Ok(report)
}

/// Validate a repaired and interpolated table without modifying it.
///
/// Per group, observed samples must be strictly ascending in distance and
/// time, and adjacent samples must respect the ceilings in `bounds`.
pub fn check_time_dist(
    table: &TrajectoryTable,
    key: GroupKey,
    bounds: &MapMatchConfig,
) -> Result<()> {
    let points = table.points();
    for rows in table.group_indices(key) {
        let label = table.group_label(key, rows[0]);
        let observed = observed_rows(points, &rows);
        let distances: Vec<f64> = observed.iter().map(|&i| points[i].distance_along_path).collect();
        let times: Vec<f64> = observed.iter().map(|&i| points[i].timestamp as f64).collect();
        ensure_increasing(&label, &distances, "distance_along_path")?;
        ensure_increasing(&label, &times, "time")?;
        check_deltas(&label, &distances, &times, bounds)?;
    }
    debug!("[MapMatch] Time and distance checks passed for {} points", table.len());
    Ok(())
}
