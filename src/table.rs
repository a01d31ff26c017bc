//! The point table and its grouping helpers.
//!
//! The table is the single mutable aggregate every operation works on.
//! Groups are always computed explicitly from a [`GroupKey`]; the table
//! never carries an index that changes meaning between calls.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::fmt;

use crate::{BoundingBox, GroupKey, TrajectoryPoint};

/// An in-memory table of trajectory points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryTable {
    points: Vec<TrajectoryPoint>,
}

impl From<Vec<TrajectoryPoint>> for TrajectoryTable {
    fn from(points: Vec<TrajectoryPoint>) -> Self {
        Self::new(points)
    }
}

impl FromIterator<TrajectoryPoint> for TrajectoryTable {
    fn from_iter<I: IntoIterator<Item = TrajectoryPoint>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl TrajectoryTable {
    pub fn new(points: Vec<TrajectoryPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [TrajectoryPoint] {
        &mut self.points
    }

    pub fn into_points(self) -> Vec<TrajectoryPoint> {
        self.points
    }

    pub fn push(&mut self, point: TrajectoryPoint) {
        self.points.push(point);
    }

    // ========================================================================
    // Ordering and grouping
    // ========================================================================

    /// Stable sort by (group key, timestamp).
    pub fn sort_by_key_and_time(&mut self, key: GroupKey) {
        self.points.sort_by(|a, b| {
            key.value(a)
                .cmp(&key.value(b))
                .then(a.timestamp.cmp(&b.timestamp))
        });
    }

    /// Stable sort by (group key, distance along path).
    pub fn sort_by_key_and_distance(&mut self, key: GroupKey) {
        self.points.sort_by(|a, b| {
            key.value(a)
                .cmp(&key.value(b))
                .then(a.distance_along_path.total_cmp(&b.distance_along_path))
        });
    }

    /// Row indices of every group, in order of each group's first appearance.
    ///
    /// Within a group, indices keep table order.
    pub fn group_indices(&self, key: GroupKey) -> Vec<Vec<usize>> {
        self.group_by(|p| key.value(p))
    }

    /// Row indices grouped by any per-point value, in order of first appearance.
    pub fn group_by<'a, K, F>(&'a self, value: F) -> Vec<Vec<usize>>
    where
        K: Hash + Eq,
        F: Fn(&'a TrajectoryPoint) -> K,
    {
        let mut slot: HashMap<K, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (i, point) in self.points.iter().enumerate() {
            let next = groups.len();
            let g = *slot.entry(value(point)).or_insert(next);
            if g == next {
                groups.push(Vec::new());
            }
            groups[g].push(i);
        }
        groups
    }

    /// Number of distinct groups under a key.
    pub fn group_count(&self, key: GroupKey) -> usize {
        self.points
            .iter()
            .map(|p| key.value(p))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Printable group value of the row at `index`.
    pub fn group_label(&self, key: GroupKey, index: usize) -> String {
        self.points
            .get(index)
            .map(|p| key.value(p).to_string())
            .unwrap_or_default()
    }

    // ========================================================================
    // Row removal
    // ========================================================================

    /// Remove rows whose entry in `marked` is true. Returns the number removed.
    ///
    /// `marked` is indexed by row; missing entries count as unmarked.
    pub fn drop_marked(&mut self, marked: &[bool]) -> usize {
        let before = self.points.len();
        let mut flags = marked.iter();
        self.points.retain(|_| !flags.next().copied().unwrap_or(false));
        before - self.points.len()
    }

    /// Remove every row of the given groups (by position in `group_indices`).
    pub fn drop_groups(&mut self, groups: &[Vec<usize>], to_drop: &[usize]) -> usize {
        let mut marked = vec![false; self.points.len()];
        for &g in to_drop {
            for &i in &groups[g] {
                marked[i] = true;
            }
        }
        self.drop_marked(&marked)
    }

    /// Keep only rows matching the predicate. Returns the number removed.
    pub fn retain<F>(&mut self, f: F) -> usize
    where
        F: FnMut(&TrajectoryPoint) -> bool,
    {
        let before = self.points.len();
        self.points.retain(f);
        before - self.points.len()
    }

    // ========================================================================
    // Filters (non-mutating)
    // ========================================================================

    fn filtered<F>(&self, filter_out: bool, mut f: F) -> TrajectoryTable
    where
        F: FnMut(&TrajectoryPoint) -> bool,
    {
        self.points
            .iter()
            .filter(|p| f(*p) != filter_out)
            .cloned()
            .collect()
    }

    /// Points inside the bounding box (edges included), or outside with `filter_out`.
    pub fn filter_bbox(&self, bbox: &BoundingBox, filter_out: bool) -> TrajectoryTable {
        self.filtered(filter_out, |p| bbox.contains(p.lat, p.lon))
    }

    /// Points with `start < timestamp <= end`; an open bound is not checked.
    pub fn filter_by_datetime(
        &self,
        start: Option<i64>,
        end: Option<i64>,
        filter_out: bool,
    ) -> TrajectoryTable {
        self.filtered(filter_out, |p| {
            start.map_or(true, |s| p.timestamp > s) && end.map_or(true, |e| p.timestamp <= e)
        })
    }

    pub fn filter_by_object_id(&self, object_id: &str, filter_out: bool) -> TrajectoryTable {
        self.filtered(filter_out, |p| p.object_id == object_id)
    }

    pub fn filter_by_tid(&self, tid: &str, filter_out: bool) -> TrajectoryTable {
        self.filtered(filter_out, |p| p.tid.as_deref() == Some(tid))
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Bounding box of all valid points.
    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.points)
    }

    /// Dataset overview: counts, time span, extent and feature ranges.
    pub fn summary(&self) -> TableSummary {
        let objects: HashSet<&str> = self.points.iter().map(|p| p.object_id.as_str()).collect();
        let tids: HashSet<&str> = self.points.iter().filter_map(|p| p.tid.as_deref()).collect();

        TableSummary {
            points: self.points.len(),
            objects: objects.len(),
            trajectories: tids.len(),
            start: self.points.iter().map(|p| p.timestamp).min(),
            end: self.points.iter().map(|p| p.timestamp).max(),
            bbox: self.bbox(),
            time_to_prev: min_max(self.points.iter().map(|p| p.time_to_prev)),
            speed_to_prev: min_max(self.points.iter().map(|p| p.speed_to_prev)),
            dist_to_prev: min_max(self.points.iter().map(|p| p.dist_to_prev)),
        }
    }
}

/// Minimum and maximum of the finite values, if any.
fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.filter(|v| v.is_finite()).fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Overview of a trajectory table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub points: usize,
    pub objects: usize,
    /// Distinct trajectory ids (0 when none are assigned)
    pub trajectories: usize,
    /// Earliest timestamp (ms)
    pub start: Option<i64>,
    /// Latest timestamp (ms)
    pub end: Option<i64>,
    pub bbox: Option<BoundingBox>,
    pub time_to_prev: Option<(f64, f64)>,
    pub speed_to_prev: Option<(f64, f64)>,
    pub dist_to_prev: Option<(f64, f64)>,
}

fn format_millis(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

impl fmt::Display for TableSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of points: {}", self.points)?;
        writeln!(f, "Number of objects: {}", self.objects)?;
        if self.trajectories > 0 {
            writeln!(f, "Number of trajectories: {}", self.trajectories)?;
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            writeln!(f, "Start: {}  End: {}", format_millis(start), format_millis(end))?;
        }
        if let Some(bbox) = &self.bbox {
            writeln!(f, "Bounding box: {}", bbox)?;
        }
        let ranges = [
            ("Gap time (s)", self.time_to_prev),
            ("Speed (m/s)", self.speed_to_prev),
            ("Distance (m)", self.dist_to_prev),
        ];
        for (label, range) in ranges {
            if let Some((lo, hi)) = range {
                writeln!(f, "{} max: {:.3}  min: {:.3}", label, hi, lo)?;
            }
        }
        Ok(())
    }
}
