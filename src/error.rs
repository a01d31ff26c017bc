//! Unified error handling.
//!
//! Only fatal conditions are raised as errors. Insufficient data (single-point
//! groups, trajectories without enough observed points) is reported through
//! the result structs of each operation instead, so a run can continue.

use thiserror::Error;

/// Errors raised by the trajectory preprocessing operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrajectoryError {
    /// Input data does not satisfy an operation's precondition.
    #[error("precondition violated in group '{group}' at index {index}: {reason}")]
    PreconditionViolation {
        group: String,
        index: usize,
        reason: String,
    },

    /// A group has too few points for an operation that cannot degrade gracefully.
    #[error("group '{group}' has {point_count} points, need at least {minimum_required}")]
    InsufficientPoints {
        group: String,
        point_count: usize,
        minimum_required: usize,
    },

    /// A delta between adjacent observed points exceeds a plausibility ceiling.
    #[error("group '{group}' at index {index}: {quantity} {value} exceeds limit {limit}")]
    PlausibilityViolation {
        group: String,
        index: usize,
        quantity: &'static str,
        value: f64,
        limit: f64,
    },

    /// A fixed-point loop did not settle within its iteration cap.
    #[error("{operation} did not converge after {iterations} iterations")]
    NonConvergence {
        operation: &'static str,
        iterations: usize,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for trajectory operations.
pub type Result<T> = std::result::Result<T, TrajectoryError>;

impl TrajectoryError {
    /// Create a precondition violation error.
    pub fn precondition(group: impl Into<String>, index: usize, reason: impl Into<String>) -> Self {
        Self::PreconditionViolation {
            group: group.into(),
            index,
            reason: reason.into(),
        }
    }

    /// Create a plausibility violation error.
    pub fn plausibility(
        group: impl Into<String>,
        index: usize,
        quantity: &'static str,
        value: f64,
        limit: f64,
    ) -> Self {
        Self::PlausibilityViolation {
            group: group.into(),
            index,
            quantity,
            value,
            limit,
        }
    }

    /// Whether the error describes bad input data rather than bad parameters.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::PreconditionViolation { .. }
                | Self::InsufficientPoints { .. }
                | Self::PlausibilityViolation { .. }
        )
    }
}

/// Extension trait for converting `Option` into trajectory errors.
pub trait OptionExt<T> {
    /// Map `None` to [`TrajectoryError::InsufficientPoints`].
    fn ok_or_insufficient_points(
        self,
        group: &str,
        point_count: usize,
        minimum_required: usize,
    ) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_insufficient_points(
        self,
        group: &str,
        point_count: usize,
        minimum_required: usize,
    ) -> Result<T> {
        self.ok_or_else(|| TrajectoryError::InsufficientPoints {
            group: group.to_string(),
            point_count,
            minimum_required,
        })
    }
}
