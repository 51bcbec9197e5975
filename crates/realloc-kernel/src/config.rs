//! Configuration types for the reallocation kernel.

use serde::{Deserialize, Serialize};

use crate::error::ReallocationError;

/// Microregion value marking units that belong to no microregion.
pub const NO_MICROREGION: &str = "PENDENTE";

/// Top-level allocation configuration.
///
/// Defines the target territory size, the search budget and the partitioner
/// parameters. Loaded from JSON at runtime; every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Minimum acceptable average number of units per agent
    pub target_min: usize,

    /// Maximum acceptable average number of units per agent
    pub target_max: usize,

    /// Desired average units per agent; overrides the min/max midpoint when set
    pub desired_avg: Option<f64>,

    /// Maximum number of group-count candidates the search evaluates
    pub max_rounds: usize,

    /// Microregion value exempt from microregion containment
    pub no_microregion: String,

    /// How the search moves the group count when the average is off target
    pub step_direction: StepDirection,

    /// Prefix for synthesized territory labels ("Region A", "Region B", ...)
    pub region_label_prefix: String,

    /// Spatial partitioner parameters
    pub partitioner: PartitionerConfig,
}

/// Direction of the group-count step when the average size misses the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDirection {
    /// Average below `target_min` adds a group, above `target_max` removes one.
    ///
    /// This is the production behaviour: undersized territories grow the
    /// count until the upper bound plateaus the search.
    #[default]
    GrowOnUndersize,
    /// Average below `target_min` removes a group, above `target_max` adds one.
    TowardTarget,
}

/// Parameters for the seeded k-means partitioner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionerConfig {
    /// Seed for the partitioner's RNG
    pub seed: u64,

    /// Independent k-means++ seedings per call; the lowest inertia wins
    pub restarts: usize,

    /// Lloyd iterations per restart
    pub max_iterations: usize,

    /// Stop a restart once no centroid moves further than this
    pub tolerance: f64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            target_min: 40,
            target_max: 43,
            desired_avg: None,
            max_rounds: 20,
            no_microregion: NO_MICROREGION.to_string(),
            step_direction: StepDirection::default(),
            region_label_prefix: "Region".to_string(),
            partitioner: PartitionerConfig::default(),
        }
    }
}

impl Default for PartitionerConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            restarts: 10,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

impl AllocationConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The desired average, if one was supplied and is usable.
    pub fn effective_desired_avg(&self) -> Option<f64> {
        self.desired_avg.filter(|avg| avg.is_finite() && *avg > 0.0)
    }

    /// Reject size bounds the search cannot work with.
    pub fn validate(&self) -> Result<(), ReallocationError> {
        if self.target_max == 0 && self.effective_desired_avg().is_none() {
            return Err(ReallocationError::config(
                "target_max must be greater than zero when no desired average is given",
            ));
        }
        if self.target_min == 0 {
            return Err(ReallocationError::config("target_min must be greater than zero"));
        }
        if self.target_max > 0 && self.target_min > self.target_max {
            return Err(ReallocationError::config(format!(
                "target_min ({}) must not exceed target_max ({})",
                self.target_min, self.target_max
            )));
        }
        if self.max_rounds == 0 {
            return Err(ReallocationError::config("max_rounds must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_operational_target() {
        let config = AllocationConfig::default();
        assert_eq!(config.target_min, 40);
        assert_eq!(config.target_max, 43);
        assert_eq!(config.max_rounds, 20);
        assert_eq!(config.partitioner.seed, 42);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = AllocationConfig::from_json(
            r#"{"target_min": 10, "target_max": 12, "partitioner": {"seed": 7}}"#,
        )
        .unwrap();
        assert_eq!(config.target_min, 10);
        assert_eq!(config.partitioner.seed, 7);
        assert_eq!(config.partitioner.restarts, 10);
        assert_eq!(config.no_microregion, NO_MICROREGION);
        assert_eq!(config.step_direction, StepDirection::GrowOnUndersize);
    }

    #[test]
    fn test_step_direction_from_json() {
        let config = AllocationConfig::from_json(r#"{"step_direction": "toward_target"}"#).unwrap();
        assert_eq!(config.step_direction, StepDirection::TowardTarget);
    }

    #[test]
    fn test_zero_max_without_desired_avg_is_rejected() {
        let config = AllocationConfig {
            target_min: 0,
            target_max: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ReallocationError::Configuration { .. })
        ));
    }

    #[test]
    fn test_non_positive_desired_avg_is_ignored() {
        let config = AllocationConfig {
            desired_avg: Some(0.0),
            ..Default::default()
        };
        assert_eq!(config.effective_desired_avg(), None);
    }

    #[test]
    fn test_inverted_bounds_are_rejected() {
        let config = AllocationConfig {
            target_min: 50,
            target_max: 43,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
