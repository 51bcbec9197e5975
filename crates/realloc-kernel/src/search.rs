//! Group-size search: pick a group count whose average size hits the target.
//!
//! The search starts from an initial estimate `k0`, partitions, repairs
//! containment, and steps `k` by one until the average units per group falls
//! inside `[target_min, target_max]`, the step stops changing `k` (plateau),
//! or the round cap is reached.
//!
//! Loop state lives in an explicit [`SearchState`] accumulator and each
//! round's decision is made by the pure [`next_step`] function, so the
//! termination logic can be tested without a partitioner.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{AllocationConfig, StepDirection};
use crate::containment::ContainmentEnforcer;
use crate::error::{ReallocationError, ReallocationResult};
use crate::partition::{Partition, Partitioner};
use crate::unit::{Coordinates, GeographicUnit};

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Average group size landed inside the target range
    Accepted,
    /// The next step would revisit the previous candidate count
    Plateau,
    /// Round cap reached without hitting the target
    RoundCap,
    /// No units to partition
    NoCapacity,
}

/// Inclusive range of candidate group counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBounds {
    pub lower: usize,
    pub upper: usize,
}

impl GroupBounds {
    /// `[max(1, current_agents), total / target_min + 5]`.
    ///
    /// When there are more current agents than the upper bound allows, the
    /// upper bound is raised to the lower one.
    pub fn new(total: usize, current_agents: usize, target_min: usize) -> Self {
        let lower = current_agents.max(1);
        let upper = (total / target_min.max(1) + 5).max(lower);
        Self { lower, upper }
    }

    pub fn clamp(&self, k: usize) -> usize {
        k.clamp(self.lower, self.upper)
    }
}

/// Initial group count estimate.
///
/// `ceil(total / desired_avg)` when a positive desired average is set,
/// otherwise `ceil(total / midpoint(target_min, target_max))`.
pub fn initial_group_count(total: usize, config: &AllocationConfig) -> ReallocationResult<usize> {
    if let Some(desired) = config.effective_desired_avg() {
        let k0 = (total as f64 / desired).ceil() as usize;
        info!(k0, total, desired_avg = desired, "Initial group count from desired average");
        return Ok(k0);
    }

    if config.target_max == 0 {
        return Err(ReallocationError::config(
            "target_max must be greater than zero when no desired average is given",
        ));
    }

    let midpoint = (config.target_min + config.target_max) as f64 / 2.0;
    let k0 = (total as f64 / midpoint).ceil() as usize;
    info!(k0, total, midpoint, "Initial group count from target range");
    Ok(k0)
}

/// Accumulator threaded through the search rounds.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    /// Most recently evaluated candidate partition
    pub best_partition: Option<Partition>,
    /// Group count that produced `best_partition`
    pub best_k: usize,
    /// Group count chosen by the previous adjustment
    pub evaluated_k: usize,
}

impl SearchState {
    pub fn new(k0: usize) -> Self {
        Self {
            best_partition: None,
            best_k: k0,
            evaluated_k: k0,
        }
    }

    /// Keep `partition` as the current best; ties go to the last evaluated.
    pub fn with_candidate(self, partition: Partition, k: usize) -> Self {
        Self {
            best_partition: Some(partition),
            best_k: k,
            ..self
        }
    }

    /// Remember the adjusted group count for the plateau check.
    pub fn with_adjusted(self, next_k: usize) -> Self {
        Self {
            evaluated_k: next_k,
            ..self
        }
    }
}

/// Decision after evaluating one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue(usize),
    Stop(StopReason),
}

/// Decide what follows a candidate with `k` groups and average size `avg`.
pub fn next_step(
    state: &SearchState,
    round: usize,
    k: usize,
    avg: f64,
    config: &AllocationConfig,
    bounds: &GroupBounds,
) -> Step {
    let min = config.target_min as f64;
    let max = config.target_max as f64;
    if (min..=max).contains(&avg) {
        return Step::Stop(StopReason::Accepted);
    }

    let grow = match config.step_direction {
        StepDirection::GrowOnUndersize => avg < min,
        StepDirection::TowardTarget => avg > max,
    };
    let next = if grow {
        (k + 1).min(bounds.upper)
    } else {
        k.saturating_sub(1).max(bounds.lower)
    };

    if next == state.evaluated_k && round > 0 {
        Step::Stop(StopReason::Plateau)
    } else {
        Step::Continue(next)
    }
}

/// Result of a group-size search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// Containment-repaired partition of the chosen candidate
    pub partition: Partition,
    /// Group count used for `partition`
    pub k: usize,
    /// Initial estimate
    pub k0: usize,
    /// Rounds evaluated
    pub rounds: usize,
    pub stop: StopReason,
    pub bounds: GroupBounds,
}

impl SearchOutcome {
    /// Average units per group for the chosen `k`.
    pub fn avg_group_size(&self) -> f64 {
        if self.k == 0 {
            0.0
        } else {
            self.partition.len() as f64 / self.k as f64
        }
    }
}

/// Drives a [`Partitioner`] across candidate group counts.
pub struct GroupSizeSearch<'a, P: Partitioner + ?Sized> {
    config: &'a AllocationConfig,
    partitioner: &'a P,
    enforcer: &'a ContainmentEnforcer,
}

impl<'a, P: Partitioner + ?Sized> GroupSizeSearch<'a, P> {
    pub fn new(
        config: &'a AllocationConfig,
        partitioner: &'a P,
        enforcer: &'a ContainmentEnforcer,
    ) -> Self {
        Self {
            config,
            partitioner,
            enforcer,
        }
    }

    /// Search for a group count whose average size is on target.
    ///
    /// `coordinates[i]` belongs to `units[i]`. Every candidate is repaired by
    /// the containment enforcer before it is recorded.
    pub fn search(
        &self,
        units: &[GeographicUnit],
        coordinates: &[Coordinates],
        current_agent_count: usize,
    ) -> ReallocationResult<SearchOutcome> {
        self.config.validate()?;

        let total = units.len();
        let k0 = initial_group_count(total, self.config)?;
        let bounds = GroupBounds::new(total, current_agent_count, self.config.target_min);
        info!(k0, lower = bounds.lower, upper = bounds.upper, total, "Starting group-size search");

        let mut state = SearchState::new(k0);
        let mut k = k0;
        let mut rounds = 0;
        let mut stop = StopReason::RoundCap;

        for round in 0..self.config.max_rounds {
            let clamped = bounds.clamp(k).min(total);
            if clamped == 0 {
                warn!(total, "No units available to partition");
                stop = StopReason::NoCapacity;
                break;
            }
            if clamped != k {
                debug!(requested = k, clamped, "Group count clamped into bounds");
            }
            k = clamped;

            let groups = self.partitioner.partition(coordinates, k)?;
            if groups.len() != total {
                warn!(k, expected = total, got = groups.len(), "Partitioner returned the wrong number of assignments");
                return Err(ReallocationError::InvalidGroupCount {
                    k,
                    points: coordinates.len(),
                });
            }
            let candidate = self.enforcer.enforce(&Partition::from_groups(groups), units);
            let avg = total as f64 / k as f64;
            rounds = round + 1;
            info!(round, k, avg_group_size = avg, "Evaluated group count");

            state = state.with_candidate(candidate, k);
            match next_step(&state, round, k, avg, self.config, &bounds) {
                Step::Stop(reason) => {
                    stop = reason;
                    break;
                }
                Step::Continue(next) => {
                    state = state.with_adjusted(next);
                    k = next;
                }
            }
        }

        match stop {
            StopReason::Accepted => info!(k = state.best_k, rounds, "Group-size target reached"),
            StopReason::Plateau | StopReason::RoundCap => warn!(
                k = state.best_k,
                rounds,
                reason = ?stop,
                target_min = self.config.target_min,
                target_max = self.config.target_max,
                "Group-size target not reached; keeping the last evaluated partition"
            ),
            StopReason::NoCapacity => {}
        }

        let best_k = if state.best_partition.is_some() { state.best_k } else { 0 };
        Ok(SearchOutcome {
            partition: state
                .best_partition
                .unwrap_or_else(|| Partition::unclustered(total)),
            k: best_k,
            k0,
            rounds,
            stop,
            bounds,
        })
    }
}
