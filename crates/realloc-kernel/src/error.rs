//! Fatal error conditions of a reallocation run.
//!
//! Everything else (degraded rules, non-converging search, empty containers)
//! is recovered locally and reported through `tracing` warnings.

use thiserror::Error;

/// Errors that abort a reallocation run before any result is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReallocationError {
    /// Size bounds or search budget cannot drive the search.
    #[error("invalid allocation configuration: {reason}")]
    Configuration {
        /// What is wrong with the configuration
        reason: String,
    },

    /// A unit has no usable coordinates, so it cannot be placed in a group.
    #[error("unit {unit_id} has no coordinates; partitioning requires latitude and longitude for every unit")]
    MissingCoordinates {
        /// The first unit found without coordinates
        unit_id: String,
    },

    /// The partitioner was asked for a group count outside `1..=points`.
    #[error("cannot partition {points} points into {k} groups")]
    InvalidGroupCount {
        /// Requested group count
        k: usize,
        /// Number of points available
        points: usize,
    },
}

impl ReallocationError {
    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

/// Result alias for fallible kernel operations.
pub type ReallocationResult<T> = Result<T, ReallocationError>;
