//! # trajprep
//!
//! GPS trajectory preprocessing library.
//!
//! This library turns raw GPS samples into analysis-ready trajectories:
//! - Kinematic features between adjacent points (distance, time, speed)
//! - Threshold-based segmentation into sub-trajectories
//! - Iterative cleaning passes (jumps, nearby points, speed ceiling, short trajectories)
//! - Map-matching time repair and node timestamp interpolation
//!
//! ## Features
//!
//! - **`parallel`** - Process independent groups in parallel with rayon (default)
//! - **`synthetic`** - Deterministic synthetic trajectory generator
//!
//! ## Quick Start
//!
//! ```rust
//! use trajprep::{GroupKey, TrajectoryPoint, TrajectoryTable};
//! use trajprep::features::compute_features;
//!
//! let mut table = TrajectoryTable::new(vec![
//!     TrajectoryPoint::new("car-1", 51.5074, -0.1278, 0),
//!     TrajectoryPoint::new("car-1", 51.5080, -0.1290, 10_000),
//!     TrajectoryPoint::new("car-1", 51.5090, -0.1300, 20_000),
//! ]);
//!
//! let report = compute_features(&mut table, GroupKey::ObjectId, true);
//! assert_eq!(report.groups, 1);
//! assert!(table.points()[1].speed_to_prev > 0.0);
//! ```

use geo::{BoundingRect, Coord, Intersects, MultiPoint, Point, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrajectoryError};

// Distance and grid helpers
pub mod geo_utils;

// Unit conversions for derived features
pub mod units;

// Explicit configuration for every operation
pub mod config;
pub use config::{
    CleaningConfig, FeatureConfig, JumpConfig, MapMatchConfig, PipelineConfig, SegmentationConfig,
};

// The mutable point table and grouping helpers
pub mod table;
pub use table::{TableSummary, TrajectoryTable};

// Kinematic feature engine
pub mod features;
pub use features::{compute_distance_features, compute_features, FeatureReport};

// Segmentation engine
pub mod segmentation;
pub use segmentation::{segment_trajectories, SegmentationReport, SplitPredicate};

// Iterative cleaning engine
pub mod cleaning;
pub use cleaning::CleaningReport;

// Map-matching repair and node time interpolation
pub mod mapmatch;
pub use mapmatch::{InterpolationReport, RepairReport};

// End-to-end composition
pub mod pipeline;
pub use pipeline::{MapMatchReport, Pipeline, PipelineReport};

// Synthetic data for tests and benchmarks
#[cfg(feature = "synthetic")]
pub mod synthetic;

// ============================================================================
// Core Types
// ============================================================================

/// Whether a point belongs to a moving or a stationary part of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Situation {
    Move,
    Stop,
}

impl Situation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Situation::Move => "move",
            Situation::Stop => "stop",
        }
    }
}

impl fmt::Display for Situation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One GPS (or map-matched) observation.
///
/// Derived values that cannot be computed (first/last point of a group,
/// zero elapsed time) are `NaN`. Equality compares floats by bit pattern, so
/// a point equals its clone even while its features are undefined.
///
/// # Example
/// ```
/// use trajprep::TrajectoryPoint;
/// let p = TrajectoryPoint::new("bus-7", -3.7972, -38.5014, 1_556_409_656_000);
/// assert!(p.is_valid());
/// assert!(p.dist_to_prev.is_nan());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    /// Moving entity this sample belongs to
    pub object_id: String,
    /// Trajectory id (object id plus an hour bucket), see [`features::assign_tid_by_hour`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    /// Segment assigned by segmentation; `None` means "same as object_id"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<u64>,
    pub lat: f64,
    pub lon: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,

    /// Cumulative distance from the trajectory start along the matched path (meters)
    #[serde(default = "nan")]
    pub distance_along_path: f64,
    /// Length of the network edge leaving this node (meters)
    #[serde(default = "nan")]
    pub edge_distance: f64,
    /// Road-network vertex without an observed timestamp
    #[serde(default)]
    pub is_node: bool,
    /// Soft-delete marker used by map-matching repair
    #[serde(default)]
    pub deleted: bool,

    #[serde(default = "nan")]
    pub dist_to_prev: f64,
    #[serde(default = "nan")]
    pub dist_to_next: f64,
    #[serde(default = "nan")]
    pub dist_prev_to_next: f64,
    /// Seconds since the previous point of the group
    #[serde(default = "nan")]
    pub time_to_prev: f64,
    /// Seconds until the next point of the group
    #[serde(default = "nan")]
    pub time_to_next: f64,
    /// Meters per second from the previous point
    #[serde(default = "nan")]
    pub speed_to_prev: f64,
    /// Meters per second to the next point
    #[serde(default = "nan")]
    pub speed_to_next: f64,

    /// Seconds to the next node (nodes only, set by interpolation)
    #[serde(default = "nan")]
    pub delta_time: f64,
    /// Edge speed in m/s (nodes only, set by interpolation)
    #[serde(default = "nan")]
    pub speed: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_cell: Option<(i64, i64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub situation: Option<Situation>,
    /// Dwell-detection run, see [`segmentation::detect_stops_by_dist_time`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_segment: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<features::CalendarTags>,
}

fn nan() -> f64 {
    f64::NAN
}

impl TrajectoryPoint {
    /// Create a raw GPS sample.
    pub fn new(object_id: impl Into<String>, lat: f64, lon: f64, timestamp: i64) -> Self {
        Self {
            object_id: object_id.into(),
            tid: None,
            segment_id: None,
            lat,
            lon,
            timestamp,
            distance_along_path: f64::NAN,
            edge_distance: f64::NAN,
            is_node: false,
            deleted: false,
            dist_to_prev: f64::NAN,
            dist_to_next: f64::NAN,
            dist_prev_to_next: f64::NAN,
            time_to_prev: f64::NAN,
            time_to_next: f64::NAN,
            speed_to_prev: f64::NAN,
            speed_to_next: f64::NAN,
            delta_time: f64::NAN,
            speed: f64::NAN,
            grid_cell: None,
            situation: None,
            stop_segment: None,
            calendar: None,
        }
    }

    /// Create a map-matched sample snapped onto the path with a trusted timestamp.
    pub fn observed(
        object_id: impl Into<String>,
        lat: f64,
        lon: f64,
        timestamp: i64,
        distance_along_path: f64,
    ) -> Self {
        Self {
            distance_along_path,
            ..Self::new(object_id, lat, lon, timestamp)
        }
    }

    /// Create a road-network node. Its timestamp is unknown until interpolated.
    pub fn node(
        object_id: impl Into<String>,
        lat: f64,
        lon: f64,
        distance_along_path: f64,
        edge_distance: f64,
    ) -> Self {
        Self {
            distance_along_path,
            edge_distance,
            is_node: true,
            ..Self::new(object_id, lat, lon, 0)
        }
    }

    /// Set the trajectory id.
    pub fn with_tid(mut self, tid: impl Into<String>) -> Self {
        self.tid = Some(tid.into());
        self
    }

    /// Set the segment id.
    pub fn with_segment_id(mut self, segment_id: u64) -> Self {
        self.segment_id = Some(segment_id);
        self
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Timestamp in fractional seconds.
    pub fn time_seconds(&self) -> f64 {
        self.timestamp as f64 / 1000.0
    }

    /// Reset every feature-engine output to undefined.
    pub fn clear_features(&mut self) {
        self.dist_to_prev = f64::NAN;
        self.dist_to_next = f64::NAN;
        self.dist_prev_to_next = f64::NAN;
        self.time_to_prev = f64::NAN;
        self.time_to_next = f64::NAN;
        self.speed_to_prev = f64::NAN;
        self.speed_to_next = f64::NAN;
    }
}

impl PartialEq for TrajectoryPoint {
    fn eq(&self, other: &Self) -> bool {
        let same = |a: f64, b: f64| a.to_bits() == b.to_bits();
        self.object_id == other.object_id
            && self.tid == other.tid
            && self.segment_id == other.segment_id
            && same(self.lat, other.lat)
            && same(self.lon, other.lon)
            && self.timestamp == other.timestamp
            && same(self.distance_along_path, other.distance_along_path)
            && same(self.edge_distance, other.edge_distance)
            && self.is_node == other.is_node
            && self.deleted == other.deleted
            && same(self.dist_to_prev, other.dist_to_prev)
            && same(self.dist_to_next, other.dist_to_next)
            && same(self.dist_prev_to_next, other.dist_prev_to_next)
            && same(self.time_to_prev, other.time_to_prev)
            && same(self.time_to_next, other.time_to_next)
            && same(self.speed_to_prev, other.speed_to_prev)
            && same(self.speed_to_next, other.speed_to_next)
            && same(self.delta_time, other.delta_time)
            && same(self.speed, other.speed)
            && self.grid_cell == other.grid_cell
            && self.situation == other.situation
            && self.stop_segment == other.stop_segment
            && self.calendar == other.calendar
    }
}

/// Which field groups points into trajectories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    /// Raw moving-object identifier
    #[default]
    ObjectId,
    /// Trajectory id; points without one fall back to their object id
    TrajectoryId,
    /// Segment id; unsegmented points fall back to their object id
    SegmentId,
}

impl GroupKey {
    /// The grouping value of a point under this key.
    pub fn value<'a>(&self, point: &'a TrajectoryPoint) -> KeyValue<'a> {
        match self {
            GroupKey::ObjectId => KeyValue::Text(&point.object_id),
            GroupKey::TrajectoryId => match &point.tid {
                Some(tid) => KeyValue::Text(tid),
                None => KeyValue::Text(&point.object_id),
            },
            GroupKey::SegmentId => match point.segment_id {
                Some(id) => KeyValue::Number(id),
                None => KeyValue::Text(&point.object_id),
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKey::ObjectId => "object_id",
            GroupKey::TrajectoryId => "tid",
            GroupKey::SegmentId => "segment_id",
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A borrowed grouping value, ordered so that sorting by it clusters groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue<'a> {
    Text(&'a str),
    Number(u64),
}

impl fmt::Display for KeyValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Text(s) => f.write_str(s),
            KeyValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Bounding box in degrees: `(min_lat, min_lon, max_lat, max_lon)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Bounding box of a set of points. Returns `None` for an empty slice.
    pub fn from_points(points: &[TrajectoryPoint]) -> Option<Self> {
        let multi: MultiPoint<f64> = points
            .iter()
            .filter(|p| p.is_valid())
            .map(|p| Point::new(p.lon, p.lat))
            .collect::<Vec<_>>()
            .into();
        multi.bounding_rect().map(Self::from_rect)
    }

    fn from_rect(rect: Rect<f64>) -> Self {
        Self {
            min_lat: rect.min().y,
            min_lon: rect.min().x,
            max_lat: rect.max().y,
            max_lon: rect.max().x,
        }
    }

    /// The box as a `geo` rectangle (x = longitude, y = latitude).
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.min_lon,
                y: self.min_lat,
            },
            Coord {
                x: self.max_lon,
                y: self.max_lat,
            },
        )
    }

    /// Whether a coordinate lies inside the box, edges included.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.to_rect().intersects(&Coord { x: lon, y: lat })
    }

    /// Split the box into `n` equal strips along longitude, west to east.
    pub fn split(&self, n: usize) -> Vec<BoundingBox> {
        if n == 0 {
            return vec![];
        }
        let width = (self.max_lon - self.min_lon) / n as f64;
        (0..n)
            .map(|i| BoundingBox {
                min_lat: self.min_lat,
                min_lon: self.min_lon + width * i as f64,
                max_lat: self.max_lat,
                max_lon: self.min_lon + width * (i + 1) as f64,
            })
            .collect()
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.6}, {:.6}, {:.6}, {:.6})",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        )
    }
}
