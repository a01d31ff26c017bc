//! Configuration for every preprocessing operation.
//!
//! All thresholds live here instead of in shared label tables, so each
//! operation receives exactly the parameters it uses.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrajectoryError};
use crate::GroupKey;

/// Default cap on fixed-point iterations for cleaning passes.
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

/// Configuration for the kinematic feature engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Grouping used for raw trajectories.
    /// Default: object_id
    pub key: GroupKey,
    /// Sort by (key, timestamp) before computing features.
    /// Default: true
    pub sort: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            key: GroupKey::ObjectId,
            sort: true,
        }
    }
}

/// Configuration for GPS jump detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JumpConfig {
    /// All three neighbor distances must exceed this to be a jump.
    /// Default: 1.0 meters
    pub threshold: f64,
    /// A jump is `coefficient` times farther from its neighbors than they are
    /// from each other.
    /// Default: 3.0
    pub coefficient: f64,
}

impl Default for JumpConfig {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            coefficient: 3.0,
        }
    }
}

/// Configuration for the iterative cleaning passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub jumps: JumpConfig,

    /// Points closer than this to their predecessor are dropped.
    /// Default: 10.0 meters
    pub nearby_radius: f64,

    /// Points slower than this from their predecessor are dropped.
    /// Default: 0.0 m/s (only stationary duplicates)
    pub nearby_speed_radius: f64,

    /// Points faster than this to either neighbor are dropped.
    /// Default: 50.0 m/s
    pub max_speed: f64,

    /// Trajectories with fewer points are dropped.
    /// Default: 2
    pub min_points_per_trajectory: usize,

    /// Trajectories shorter than this in total are dropped.
    /// Default: 100.0 meters
    pub min_trajectory_distance: f64,

    /// Safety cap on fixed-point iterations before giving up.
    /// Default: 10000
    pub max_iterations: usize,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            jumps: JumpConfig::default(),
            nearby_radius: 10.0,
            nearby_speed_radius: 0.0,
            max_speed: 50.0,
            min_points_per_trajectory: 2,
            min_trajectory_distance: 100.0,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Configuration for threshold-based segmentation.
///
/// A `None` threshold is not checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Default: Some(3000.0) meters
    pub max_dist_between_adj_points: Option<f64>,
    /// Default: Some(7200.0) seconds
    pub max_time_between_adj_points: Option<f64>,
    /// Default: Some(50.0) m/s
    pub max_speed_between_adj_points: Option<f64>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_dist_between_adj_points: Some(3000.0),
            max_time_between_adj_points: Some(7200.0),
            max_speed_between_adj_points: Some(50.0),
        }
    }
}

/// Plausibility ceilings checked after map-matching interpolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapMatchConfig {
    /// Grouping used for map-matched trajectories.
    /// Default: tid
    pub key: GroupKey,
    /// Default: 900.0 seconds
    pub max_time_between_adj_points: f64,
    /// Default: 5000.0 meters
    pub max_dist_between_adj_points: f64,
    /// Default: 30.0 m/s
    pub max_speed: f64,
    /// Physically remove points marked deleted by ordering repair.
    /// Default: true
    pub drop_deleted: bool,
}

impl Default for MapMatchConfig {
    fn default() -> Self {
        Self {
            key: GroupKey::TrajectoryId,
            max_time_between_adj_points: 900.0,
            max_dist_between_adj_points: 5000.0,
            max_speed: 30.0,
            drop_deleted: true,
        }
    }
}

/// Configuration for a full preprocessing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub features: FeatureConfig,
    pub cleaning: CleaningConfig,
    pub segmentation: SegmentationConfig,
    /// Used by [`crate::Pipeline::run_map_matched`]
    pub map_matching: MapMatchConfig,
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(TrajectoryError::InvalidConfig(message()))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    ensure(value.is_finite() && value >= 0.0, || {
        format!("{} must be a finite, non-negative number (got {})", name, value)
    })
}

fn positive(name: &str, value: f64) -> Result<()> {
    ensure(value.is_finite() && value > 0.0, || {
        format!("{} must be a finite, positive number (got {})", name, value)
    })
}

impl JumpConfig {
    pub fn validate(&self) -> Result<()> {
        non_negative("jumps.threshold", self.threshold)?;
        positive("jumps.coefficient", self.coefficient)
    }
}

impl CleaningConfig {
    pub fn validate(&self) -> Result<()> {
        self.jumps.validate()?;
        non_negative("cleaning.nearby_radius", self.nearby_radius)?;
        non_negative("cleaning.nearby_speed_radius", self.nearby_speed_radius)?;
        positive("cleaning.max_speed", self.max_speed)?;
        non_negative("cleaning.min_trajectory_distance", self.min_trajectory_distance)?;
        ensure(self.max_iterations > 0, || {
            "cleaning.max_iterations must be at least 1".to_string()
        })
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            ("segmentation.max_dist_between_adj_points", self.max_dist_between_adj_points),
            ("segmentation.max_time_between_adj_points", self.max_time_between_adj_points),
            ("segmentation.max_speed_between_adj_points", self.max_speed_between_adj_points),
        ];
        for (name, value) in thresholds {
            if let Some(v) = value {
                non_negative(name, v)?;
            }
        }
        ensure(thresholds.iter().any(|(_, v)| v.is_some()), || {
            "segmentation needs at least one threshold".to_string()
        })
    }
}

impl MapMatchConfig {
    pub fn validate(&self) -> Result<()> {
        positive("map_matching.max_time_between_adj_points", self.max_time_between_adj_points)?;
        positive("map_matching.max_dist_between_adj_points", self.max_dist_between_adj_points)?;
        positive("map_matching.max_speed", self.max_speed)
    }
}

impl PipelineConfig {
    /// Validate every section of the configuration.
    pub fn validate(&self) -> Result<()> {
        self.cleaning.validate()?;
        self.segmentation.validate()?;
        self.map_matching.validate()
    }
}
