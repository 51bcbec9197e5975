//! Realloc Kernel: territory reallocation for field extension agents
//!
//! This crate redistributes geographically located work units (aviaries)
//! among field agents. Units matched by immutability rules keep their agent;
//! the rest are partitioned spatially into territories of a target size,
//! nuclei and microregions are kept whole, and each territory is mapped back
//! onto an agent so that as many units as possible stay where they are.

pub mod config;
pub mod containment;
pub mod error;
pub mod kernel;
pub mod mapper;
pub mod partition;
pub mod postpass;
pub mod roster;
pub mod rules;
pub mod search;
pub mod unit;

pub use config::{AllocationConfig, NO_MICROREGION, PartitionerConfig, StepDirection};
pub use containment::{ContainmentEnforcer, PassStats};
pub use error::{ReallocationError, ReallocationResult};
pub use kernel::{Allocation, Reallocator};
pub use mapper::{AgentMapper, AgentMapping, MappedAgent, MappingSource};
pub use partition::{GroupId, KMeansPartitioner, Partition, Partitioner};
pub use postpass::{AssumeContiguous, ContinuityCheck, LoadBalancer, UnbalancedLoad};
pub use roster::{Roster, RosterSet};
pub use rules::{Degradation, ImmutabilityRule, evaluate_rules};
pub use search::{GroupBounds, GroupSizeSearch, SearchOutcome, StopReason};
pub use unit::{Coordinates, GeographicUnit, UnitTable, columns};
