//! The reallocation kernel: immutability flags, then optimized territories.
//!
//! ## Usage
//!
//! ```ignore
//! use realloc_kernel::{AllocationConfig, Reallocator, RosterSet};
//!
//! let reallocator = Reallocator::new(AllocationConfig::default());
//!
//! let flagged = reallocator.apply_immutability(&table, &rules, &rosters);
//! let current_agents = flagged.current_agents();
//! let allocation = reallocator.optimize_allocation(&flagged, &current_agents)?;
//!
//! for unit in allocation.table.units() {
//!     println!("{} -> {:?}", unit.unit_id, unit.proposed_agent);
//! }
//! ```

use tracing::{info, warn};

use crate::config::AllocationConfig;
use crate::containment::ContainmentEnforcer;
use crate::error::{ReallocationError, ReallocationResult};
use crate::mapper::{AgentMapper, AgentMapping};
use crate::partition::{KMeansPartitioner, Partition, Partitioner};
use crate::postpass::{AssumeContiguous, ContinuityCheck, LoadBalancer, UnbalancedLoad};
use crate::roster::RosterSet;
use crate::rules::{evaluate_rules, ImmutabilityRule};
use crate::search::{GroupSizeSearch, SearchOutcome};
use crate::unit::UnitTable;

/// Result of [`Reallocator::optimize_allocation`].
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Input table with `proposed_agent` filled in for every unit
    pub table: UnitTable,
    /// Final partition the proposals were derived from
    pub partition: Partition,
    /// Group-size search summary; `None` for empty input
    pub search: Option<SearchOutcome>,
    /// Group to agent mapping
    pub mapping: AgentMapping,
    /// Continuity verdict; `None` when the check could not run
    pub continuous: Option<bool>,
}

/// Runs the reallocation pipeline over a unit table.
///
/// The partitioner and post-pass hooks are pluggable; defaults are the seeded
/// k-means partitioner, no load balancing and no continuity verification.
pub struct Reallocator {
    config: AllocationConfig,
    partitioner: Box<dyn Partitioner>,
    balancer: Box<dyn LoadBalancer>,
    continuity: Box<dyn ContinuityCheck>,
    enforcer: ContainmentEnforcer,
    mapper: AgentMapper,
}

impl Reallocator {
    pub fn new(config: AllocationConfig) -> Self {
        let partitioner = KMeansPartitioner::new(config.partitioner.clone());
        let enforcer = ContainmentEnforcer::new(config.no_microregion.clone());
        let mapper = AgentMapper::new(config.region_label_prefix.clone());
        info!(
            target_min = config.target_min,
            target_max = config.target_max,
            desired_avg = ?config.desired_avg,
            seed = config.partitioner.seed,
            "Reallocator initialized"
        );
        Self {
            config,
            partitioner: Box::new(partitioner),
            balancer: Box::new(UnbalancedLoad),
            continuity: Box::new(AssumeContiguous),
            enforcer,
            mapper,
        }
    }

    /// Replace the spatial partitioner.
    pub fn with_partitioner(mut self, partitioner: Box<dyn Partitioner>) -> Self {
        self.partitioner = partitioner;
        self
    }

    /// Install a demand-load balancing post-pass.
    pub fn with_load_balancer(mut self, balancer: Box<dyn LoadBalancer>) -> Self {
        self.balancer = balancer;
        self
    }

    /// Install a continuity check.
    pub fn with_continuity_check(mut self, continuity: Box<dyn ContinuityCheck>) -> Self {
        self.continuity = continuity;
        self
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// Copy of `table` with immutable flags recomputed from `rules`.
    ///
    /// Every flag is overwritten, including flags read back from an earlier
    /// export, so only units the current rules match come out frozen. No
    /// other column changes.
    pub fn apply_immutability(
        &self,
        table: &UnitTable,
        rules: &[ImmutabilityRule],
        rosters: &RosterSet,
    ) -> UnitTable {
        if table.is_empty() {
            warn!("Empty table; no immutability rules applied");
            return table.clone();
        }

        let flags = evaluate_rules(table, rules, rosters);
        let mut flagged = table.clone();
        for (unit, flag) in flagged.units_mut().iter_mut().zip(flags) {
            unit.immutable = flag;
        }

        info!(
            rules = rules.len(),
            immutable = flagged.immutable_count(),
            total = flagged.len(),
            "Immutability rules applied"
        );
        flagged
    }

    /// Compute a proposed agent for every unit.
    ///
    /// # Errors
    ///
    /// - [`ReallocationError::Configuration`] for unusable size bounds
    /// - [`ReallocationError::MissingCoordinates`] when any unit lacks
    ///   coordinates; no partial result is produced
    pub fn optimize_allocation(
        &self,
        table: &UnitTable,
        current_agents: &[String],
    ) -> ReallocationResult<Allocation> {
        if table.is_empty() {
            warn!("Empty table; nothing to optimize");
            return Ok(Allocation {
                table: table.clone(),
                partition: Partition::default(),
                search: None,
                mapping: AgentMapping::default(),
                continuous: None,
            });
        }

        self.config.validate()?;
        let coordinates = table
            .coordinates()
            .map_err(|unit_id| ReallocationError::MissingCoordinates { unit_id })?;
        let units = table.units();

        let search = GroupSizeSearch::new(&self.config, self.partitioner.as_ref(), &self.enforcer)
            .search(units, &coordinates, current_agents.len())?;

        // Re-partitioning during the search can re-split containers repaired earlier.
        let repaired = self.enforcer.enforce(&search.partition, units);
        let partition = self.rebalance(repaired, table);

        let continuous = match self.continuity.check(&partition, units) {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                warn!(check = self.continuity.name(), error = %e, "Continuity check failed");
                None
            }
        };

        let mapping = self.mapper.assign(&partition, units, current_agents);
        let optimized = self.mapper.apply(table, &partition, &mapping);

        info!(
            k = search.k,
            groups = partition.group_count(),
            stop = ?search.stop,
            immutable = optimized.immutable_count(),
            "Allocation optimized"
        );

        Ok(Allocation {
            table: optimized,
            partition,
            search: Some(search),
            mapping,
            continuous,
        })
    }

    /// Run the load balancer, falling back to `partition` if it misbehaves.
    fn rebalance(&self, partition: Partition, table: &UnitTable) -> Partition {
        match self.balancer.rebalance(&partition, table.units()) {
            Ok(balanced) if balanced.len() == partition.len() => balanced,
            Ok(balanced) => {
                warn!(
                    balancer = self.balancer.name(),
                    expected = partition.len(),
                    got = balanced.len(),
                    "Load balancer changed the unit count; ignoring its result"
                );
                partition
            }
            Err(e) => {
                warn!(balancer = self.balancer.name(), error = %e, "Load balancing failed");
                partition
            }
        }
    }
}
