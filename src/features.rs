//! Kinematic feature engine.
//!
//! For every group, each point gets the distance, elapsed time and speed to
//! its neighbors. Groups never see each other's points, which is what lets
//! them be computed in parallel and scattered back into the table.
//!
//! ## Features per point
//! - `dist_to_prev`, `dist_to_next`, `dist_prev_to_next` (meters, haversine)
//! - `time_to_prev`, `time_to_next` (seconds)
//! - `speed_to_prev`, `speed_to_next` (m/s)
//!
//! Missing neighbors and zero elapsed times produce `NaN`, never an error.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Weekday};
use log::{debug, info, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geo_utils::{haversine, point_to_index_grid, GridSpec};
use crate::{GroupKey, Situation, TrajectoryPoint, TrajectoryTable};

/// Outcome of a feature computation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureReport {
    /// Number of groups processed
    pub groups: usize,
    /// Number of points processed
    pub points: usize,
    /// Groups with a single point; all their features are undefined
    pub single_point_groups: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeatureSet {
    DistanceOnly,
    Full,
}

/// Per-group feature columns, index-aligned with the group's rows.
#[derive(Debug, Default)]
struct GroupFeatures {
    dist_to_prev: Vec<f64>,
    dist_to_next: Vec<f64>,
    dist_prev_to_next: Vec<f64>,
    time_to_prev: Vec<f64>,
    time_to_next: Vec<f64>,
    speed_to_prev: Vec<f64>,
    speed_to_next: Vec<f64>,
}

/// Shift a column by `offset` positions, filling vacated slots with `NaN`.
///
/// A positive offset moves values toward the end (`out[i] = values[i - offset]`),
/// so `shift(x, 1)` is "previous" and `shift(x, -1)` is "next".
pub fn shift(values: &[f64], offset: isize) -> Vec<f64> {
    let n = values.len() as isize;
    (0..n)
        .map(|i| {
            let src = i - offset;
            if (0..n).contains(&src) {
                values[src as usize]
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Speed from distance and elapsed time; zero or undefined time gives `NaN`.
#[inline]
pub(crate) fn speed(distance: f64, seconds: f64) -> f64 {
    if seconds == 0.0 || !seconds.is_finite() {
        f64::NAN
    } else {
        distance / seconds
    }
}

fn group_features(points: &[TrajectoryPoint], rows: &[usize], set: FeatureSet) -> GroupFeatures {
    let n = rows.len();
    if n <= 1 {
        let undefined = vec![f64::NAN; n];
        return GroupFeatures {
            dist_to_prev: undefined.clone(),
            dist_to_next: undefined.clone(),
            dist_prev_to_next: undefined.clone(),
            time_to_prev: undefined.clone(),
            time_to_next: undefined.clone(),
            speed_to_prev: undefined.clone(),
            speed_to_next: undefined,
        };
    }

    let lat: Vec<f64> = rows.iter().map(|&i| points[i].lat).collect();
    let lon: Vec<f64> = rows.iter().map(|&i| points[i].lon).collect();
    let (prev_lat, prev_lon) = (shift(&lat, 1), shift(&lon, 1));
    let (next_lat, next_lon) = (shift(&lat, -1), shift(&lon, -1));

    let dist_to_prev = haversine(&prev_lat, &prev_lon, &lat, &lon);
    let dist_to_next = haversine(&lat, &lon, &next_lat, &next_lon);
    let dist_prev_to_next = haversine(&prev_lat, &prev_lon, &next_lat, &next_lon);

    let (time_to_prev, time_to_next, speed_to_prev, speed_to_next) = match set {
        FeatureSet::DistanceOnly => {
            let undefined = vec![f64::NAN; n];
            (undefined.clone(), undefined.clone(), undefined.clone(), undefined)
        }
        FeatureSet::Full => {
            let t: Vec<f64> = rows.iter().map(|&i| points[i].time_seconds()).collect();
            let time_to_prev: Vec<f64> = t.iter().zip(shift(&t, 1)).map(|(c, p)| c - p).collect();
            let time_to_next: Vec<f64> = shift(&t, -1)
                .iter()
                .zip(&t)
                .map(|(nx, c)| nx - c)
                .collect();
            let speed_to_prev: Vec<f64> = dist_to_prev
                .iter()
                .zip(&time_to_prev)
                .map(|(&d, &s)| speed(d, s))
                .collect();
            let speed_to_next: Vec<f64> = dist_to_next
                .iter()
                .zip(&time_to_next)
                .map(|(&d, &s)| speed(d, s))
                .collect();
            (time_to_prev, time_to_next, speed_to_prev, speed_to_next)
        }
    };

    GroupFeatures {
        dist_to_prev,
        dist_to_next,
        dist_prev_to_next,
        time_to_prev,
        time_to_next,
        speed_to_prev,
        speed_to_next,
    }
}

fn compute_with(
    table: &mut TrajectoryTable,
    key: GroupKey,
    sort: bool,
    set: FeatureSet,
) -> FeatureReport {
    if sort {
        debug!("[Features] Sorting by {} and timestamp", key);
        table.sort_by_key_and_time(key);
    }

    let groups = table.group_indices(key);
    let points = table.points();

    #[cfg(feature = "parallel")]
    let computed: Vec<GroupFeatures> = groups
        .par_iter()
        .map(|rows| group_features(points, rows, set))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let computed: Vec<GroupFeatures> = groups
        .iter()
        .map(|rows| group_features(points, rows, set))
        .collect();

    let single_point_groups: Vec<String> = groups
        .iter()
        .filter(|rows| rows.len() == 1)
        .map(|rows| table.group_label(key, rows[0]))
        .collect();

    let points = table.points_mut();
    for (rows, features) in groups.iter().zip(computed) {
        for (j, &i) in rows.iter().enumerate() {
            let p = &mut points[i];
            p.dist_to_prev = features.dist_to_prev[j];
            p.dist_to_next = features.dist_to_next[j];
            p.dist_prev_to_next = features.dist_prev_to_next[j];
            p.time_to_prev = features.time_to_prev[j];
            p.time_to_next = features.time_to_next[j];
            p.speed_to_prev = features.speed_to_prev[j];
            p.speed_to_next = features.speed_to_next[j];
        }
    }

    for label in &single_point_groups {
        warn!("[Features] {} '{}' has a single point, features undefined", key, label);
    }

    let report = FeatureReport {
        groups: groups.len(),
        points: table.len(),
        single_point_groups,
    };
    info!(
        "[Features] Updated {} points in {} groups by {} ({} single-point)",
        report.points,
        report.groups,
        key,
        report.single_point_groups.len()
    );
    report
}

/// Compute distance, time and speed features for every point.
///
/// With `sort`, the table is first stably sorted by (key, timestamp);
/// otherwise each group is taken in table order. Running this twice on an
/// unchanged table produces identical values.
///
/// # Example
/// ```
/// use trajprep::{GroupKey, TrajectoryPoint, TrajectoryTable};
/// use trajprep::features::compute_features;
///
/// let mut table = TrajectoryTable::new(vec![
///     TrajectoryPoint::new("a", 0.0, 0.0, 0),
///     TrajectoryPoint::new("a", 0.0, 0.001, 10_000),
/// ]);
/// compute_features(&mut table, GroupKey::ObjectId, true);
/// let p = &table.points()[1];
/// assert!((p.time_to_prev - 10.0).abs() < 1e-9);
/// assert!((p.speed_to_prev - p.dist_to_prev / 10.0).abs() < 1e-9);
/// ```
pub fn compute_features(table: &mut TrajectoryTable, key: GroupKey, sort: bool) -> FeatureReport {
    compute_with(table, key, sort, FeatureSet::Full)
}

/// Compute only the three neighbor distances.
///
/// Time and speed features are reset to undefined, since they would
/// otherwise describe a previous state of the table.
pub fn compute_distance_features(
    table: &mut TrajectoryTable,
    key: GroupKey,
    sort: bool,
) -> FeatureReport {
    compute_with(table, key, sort, FeatureSet::DistanceOnly)
}

// ============================================================================
// Tagging
// ============================================================================

/// Assign `tid = object_id + YYYYMMDDHH` (UTC hour of the timestamp).
///
/// Returns the number of points tagged; points whose timestamp is outside the
/// representable calendar range keep their previous `tid`.
pub fn assign_tid_by_hour(table: &mut TrajectoryTable, sort: bool) -> usize {
    if sort {
        table.sort_by_key_and_time(GroupKey::ObjectId);
    }
    let mut tagged = 0;
    for p in table.points_mut() {
        if let Some(dt) = DateTime::from_timestamp_millis(p.timestamp) {
            p.tid = Some(format!("{}{}", p.object_id, dt.format("%Y%m%d%H")));
            tagged += 1;
        }
    }
    info!("[Features] Assigned trajectory ids to {} points", tagged);
    tagged
}

/// Part of the day a timestamp falls in, by UTC hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayPeriod {
    /// 00:00 to 05:59
    EarlyMorning,
    /// 06:00 to 11:59
    Morning,
    /// 12:00 to 17:59
    Afternoon,
    /// 18:00 to 23:59
    Evening,
}

impl DayPeriod {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=5 => DayPeriod::EarlyMorning,
            6..=11 => DayPeriod::Morning,
            12..=17 => DayPeriod::Afternoon,
            _ => DayPeriod::Evening,
        }
    }
}

/// Calendar attributes of a point's timestamp (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarTags {
    pub date: NaiveDate,
    pub hour: u32,
    pub weekday: Weekday,
    /// Saturday or Sunday
    pub weekend: bool,
    pub period: DayPeriod,
}

impl CalendarTags {
    /// Tags for a millisecond timestamp, `None` outside chrono's range.
    pub fn from_timestamp_millis(timestamp: i64) -> Option<Self> {
        let dt = DateTime::from_timestamp_millis(timestamp)?;
        let weekday = dt.weekday();
        Some(Self {
            date: dt.date_naive(),
            hour: dt.hour(),
            weekday,
            weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
            period: DayPeriod::from_hour(dt.hour()),
        })
    }

    /// Sine of the hour on a 24-hour cycle, with 23h mapped to a full turn.
    pub fn hour_sin(&self) -> f64 {
        (2.0 * std::f64::consts::PI * self.hour as f64 / 23.0).sin()
    }

    /// Cosine counterpart of [`CalendarTags::hour_sin`].
    pub fn hour_cos(&self) -> f64 {
        (2.0 * std::f64::consts::PI * self.hour as f64 / 23.0).cos()
    }
}

/// Tag every point with its date, hour, weekday, weekend flag and day period.
///
/// Returns the number of points tagged; points whose timestamp is outside the
/// representable calendar range are cleared.
pub fn assign_calendar_tags(table: &mut TrajectoryTable) -> usize {
    let mut tagged = 0;
    for p in table.points_mut() {
        p.calendar = CalendarTags::from_timestamp_millis(p.timestamp);
        tagged += usize::from(p.calendar.is_some());
    }
    debug!("[Features] Assigned calendar tags to {} points", tagged);
    tagged
}

/// Feature compared against the radius in [`assign_move_stop_by_radius`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveStopFeature {
    DistToPrev,
    SpeedToPrev,
}

/// Tag each point `Move` when the feature exceeds `radius`, `Stop` otherwise.
///
/// Points with an undefined feature are left untagged. Returns the number of stops.
pub fn assign_move_stop_by_radius(
    table: &mut TrajectoryTable,
    radius: f64,
    feature: MoveStopFeature,
) -> usize {
    let mut stops = 0;
    for p in table.points_mut() {
        let value = match feature {
            MoveStopFeature::DistToPrev => p.dist_to_prev,
            MoveStopFeature::SpeedToPrev => p.speed_to_prev,
        };
        p.situation = if value > radius {
            Some(Situation::Move)
        } else if value <= radius {
            stops += 1;
            Some(Situation::Stop)
        } else {
            None
        };
    }
    info!("[Features] {} stops with radius {}", stops, radius);
    stops
}

/// Tag every point with the `(row, col)` of its grid cell.
pub fn assign_index_grid(table: &mut TrajectoryTable, grid: &GridSpec) {
    for p in table.points_mut() {
        p.grid_cell = Some(point_to_index_grid(p.lat, p.lon, grid));
    }
    debug!("[Features] Assigned grid cells to {} points", table.len());
}
