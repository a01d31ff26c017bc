//! Synthetic GPS data generator for tests and benchmarking.
//!
//! Generates trajectory tables with known defects (jumps, dwell periods,
//! recording gaps, out-of-order map-matched samples), so cleaning and repair
//! passes can be checked against a ground truth.
//!
//! Feature-gated behind `synthetic`; not included in production builds.
//!
//! # Example
//!
//! ```rust
//! use trajprep::synthetic::SyntheticScenario;
//!
//! let scenario = SyntheticScenario {
//!     object_count: 3,
//!     points_per_object: 200,
//!     jump_probability: 0.02,
//!     seed: 42,
//!     ..SyntheticScenario::default()
//! };
//!
//! let dataset = scenario.generate();
//! assert_eq!(dataset.table.len(), dataset.metadata.total_points);
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

use crate::geo_utils::meters_to_degrees;
use crate::{TrajectoryPoint, TrajectoryTable};

// ============================================================================
// Types
// ============================================================================

/// Scenario for raw GPS trajectories.
#[derive(Debug, Clone)]
pub struct SyntheticScenario {
    /// Latitude every object starts near
    pub origin_lat: f64,
    /// Longitude every object starts near
    pub origin_lon: f64,
    pub object_count: usize,
    /// Samples per object, including injected jumps and dwell samples
    pub points_per_object: usize,
    /// Milliseconds between samples
    pub sample_interval_ms: i64,
    /// Travel speed between samples (m/s)
    pub speed_mps: f64,
    /// Standard deviation of GPS noise (meters)
    pub gps_noise_sigma_meters: f64,
    /// Chance that a sample is replaced by a jump
    pub jump_probability: f64,
    /// Distance of a jump from the true position (meters)
    pub jump_distance_meters: f64,
    /// Chance that the object starts a dwell at a sample
    pub stop_probability: f64,
    /// Samples recorded during a dwell
    pub stop_length: usize,
    /// Chance of a recording gap before a sample
    pub gap_probability: f64,
    /// Length of a recording gap (ms)
    pub gap_ms: i64,
    /// Timestamp of the first sample (ms)
    pub start_timestamp: i64,
    /// RNG seed for deterministic reproduction
    pub seed: u64,
}

impl Default for SyntheticScenario {
    fn default() -> Self {
        Self {
            origin_lat: -3.7319,
            origin_lon: -38.5267,
            object_count: 10,
            points_per_object: 500,
            sample_interval_ms: 5_000,
            speed_mps: 8.0,
            gps_noise_sigma_meters: 2.0,
            jump_probability: 0.0,
            jump_distance_meters: 2_000.0,
            stop_probability: 0.0,
            stop_length: 30,
            gap_probability: 0.0,
            gap_ms: 3 * 3_600_000,
            start_timestamp: 1_556_409_600_000,
            seed: 42,
        }
    }
}

/// Counts of what was generated and injected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetMetadata {
    pub total_points: usize,
    pub jumps_injected: usize,
    pub stop_points_injected: usize,
    pub gaps_injected: usize,
}

/// A generated table with its ground truth.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    pub table: TrajectoryTable,
    pub metadata: DatasetMetadata,
}

/// Scenario for map-matched trajectories: observed samples on a path with
/// network nodes between them.
#[derive(Debug, Clone)]
pub struct MapMatchedScenario {
    pub trajectory_count: usize,
    /// Observed samples per trajectory
    pub samples_per_trajectory: usize,
    /// Nodes placed between consecutive observed samples
    pub nodes_between_samples: usize,
    /// Path length between consecutive observed samples (meters)
    pub sample_spacing_meters: f64,
    /// Milliseconds between consecutive observed samples
    pub sample_interval_ms: i64,
    /// Chance that an observed sample gets a timestamp earlier than its predecessor
    pub out_of_order_probability: f64,
    pub start_timestamp: i64,
    pub seed: u64,
}

impl Default for MapMatchedScenario {
    fn default() -> Self {
        Self {
            trajectory_count: 5,
            samples_per_trajectory: 50,
            nodes_between_samples: 2,
            sample_spacing_meters: 120.0,
            sample_interval_ms: 15_000,
            out_of_order_probability: 0.0,
            start_timestamp: 1_556_409_600_000,
            seed: 7,
        }
    }
}

/// A generated map-matched table.
#[derive(Debug, Clone)]
pub struct MapMatchedDataset {
    pub table: TrajectoryTable,
    /// Observed samples given an out-of-order timestamp
    pub out_of_order_injected: usize,
}

// ============================================================================
// Helpers
// ============================================================================

/// Offset a position by meters north and east.
fn offset(lat: f64, lon: f64, north: f64, east: f64) -> (f64, f64) {
    // A degree of latitude spans as much as a degree of longitude at the equator.
    let dlat = meters_to_degrees(north, 0.0);
    let dlon = meters_to_degrees(east, lat);
    (lat + dlat, lon + dlon)
}

/// Box-Muller pair of standard normal samples.
fn gaussian_pair(rng: &mut StdRng) -> (f64, f64) {
    let u1: f64 = rng.gen_range(0.0001..1.0);
    let u2: f64 = rng.gen();
    let r = (-2.0 * u1.ln()).sqrt();
    (r * (2.0 * PI * u2).cos(), r * (2.0 * PI * u2).sin())
}

// ============================================================================
// Raw trajectories
// ============================================================================

impl SyntheticScenario {
    /// Generate the table, one object at a time, in timestamp order.
    pub fn generate(&self) -> SyntheticDataset {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut points = Vec::with_capacity(self.object_count * self.points_per_object);
        let mut metadata = DatasetMetadata::default();
        let step = self.speed_mps * self.sample_interval_ms as f64 / 1000.0;

        for object in 0..self.object_count {
            let object_id = format!("obj_{:04}", object);
            let (mut lat, mut lon) = offset(
                self.origin_lat,
                self.origin_lon,
                rng.gen_range(-500.0..500.0),
                rng.gen_range(-500.0..500.0),
            );
            let mut heading: f64 = rng.gen_range(0.0..(2.0 * PI));
            let mut timestamp = self.start_timestamp;
            let mut dwell_left = 0;

            for i in 0..self.points_per_object {
                if i > 0 {
                    timestamp += self.sample_interval_ms;
                    if rng.gen_bool(self.gap_probability) {
                        timestamp += self.gap_ms;
                        metadata.gaps_injected += 1;
                    }
                    if dwell_left == 0 && rng.gen_bool(self.stop_probability) {
                        dwell_left = self.stop_length;
                    }
                    if dwell_left > 0 {
                        dwell_left -= 1;
                        metadata.stop_points_injected += 1;
                    } else {
                        heading += rng.gen_range(-0.3..0.3);
                        (lat, lon) = offset(lat, lon, step * heading.sin(), step * heading.cos());
                    }
                }

                let (mut sample_lat, mut sample_lon) = (lat, lon);
                if self.gps_noise_sigma_meters > 0.0 {
                    let (z0, z1) = gaussian_pair(&mut rng);
                    (sample_lat, sample_lon) = offset(
                        sample_lat,
                        sample_lon,
                        z0 * self.gps_noise_sigma_meters,
                        z1 * self.gps_noise_sigma_meters,
                    );
                }
                // Jumps are kept away from the ends so both neighbors exist.
                let interior = i > 0 && i + 1 < self.points_per_object;
                if interior && rng.gen_bool(self.jump_probability) {
                    let angle: f64 = rng.gen_range(0.0..(2.0 * PI));
                    (sample_lat, sample_lon) = offset(
                        sample_lat,
                        sample_lon,
                        self.jump_distance_meters * angle.sin(),
                        self.jump_distance_meters * angle.cos(),
                    );
                    metadata.jumps_injected += 1;
                }

                points.push(TrajectoryPoint::new(&object_id, sample_lat, sample_lon, timestamp));
            }
        }

        metadata.total_points = points.len();
        SyntheticDataset {
            table: TrajectoryTable::new(points),
            metadata,
        }
    }
}

// ============================================================================
// Map-matched trajectories
// ============================================================================

impl MapMatchedScenario {
    /// Generate observed samples and nodes along a straight eastward path per
    /// trajectory. Rows of a trajectory are ordered by distance.
    pub fn generate(&self) -> MapMatchedDataset {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut points = Vec::new();
        let mut out_of_order_injected = 0;
        let node_spacing = self.sample_spacing_meters / (self.nodes_between_samples + 1) as f64;

        for trajectory in 0..self.trajectory_count {
            let object_id = format!("mm_{:04}", trajectory);
            let tid = format!("{}_1", object_id);
            let (lat0, lon0) = (-3.7 + trajectory as f64 * 0.01, -38.5);
            let position = |distance: f64| offset(lat0, lon0, 0.0, distance);

            for k in 0..self.samples_per_trajectory {
                let distance = k as f64 * self.sample_spacing_meters;
                let mut timestamp = self.start_timestamp + k as i64 * self.sample_interval_ms;
                if k > 0 && rng.gen_bool(self.out_of_order_probability) {
                    timestamp -= 2 * self.sample_interval_ms;
                    out_of_order_injected += 1;
                }
                let (lat, lon) = position(distance);
                let sample = TrajectoryPoint::observed(&object_id, lat, lon, timestamp, distance);
                points.push(sample.with_tid(&tid));

                if k + 1 < self.samples_per_trajectory {
                    for n in 1..=self.nodes_between_samples {
                        let node_distance = distance + n as f64 * node_spacing;
                        let (lat, lon) = position(node_distance);
                        points.push(
                            TrajectoryPoint::node(&object_id, lat, lon, node_distance, node_spacing)
                                .with_tid(&tid),
                        );
                    }
                }
            }
        }

        MapMatchedDataset {
            table: TrajectoryTable::new(points),
            out_of_order_injected,
        }
    }
}
