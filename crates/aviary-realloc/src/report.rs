//! Run report: what went in, what the search decided, where results went.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use realloc_kernel::{Allocation, GroupBounds, MappingSource, SearchOutcome, StopReason};

/// Group-size search summary without the partition itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSummary {
    pub k0: usize,
    pub k: usize,
    pub rounds: usize,
    pub stop: StopReason,
    pub bounds: GroupBounds,
    pub avg_group_size: f64,
}

impl From<&SearchOutcome> for SearchSummary {
    fn from(outcome: &SearchOutcome) -> Self {
        Self {
            k0: outcome.k0,
            k: outcome.k,
            rounds: outcome.rounds,
            stop: outcome.stop,
            bounds: outcome.bounds,
            avg_group_size: outcome.avg_group_size(),
        }
    }
}

/// Record of one reallocation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Input table
    pub input: PathBuf,
    pub total_units: usize,
    pub immutable_units: usize,
    pub current_agents: usize,
    /// Territories mapped to an existing agent
    pub kept_agents: usize,
    /// Territories given a synthesized label
    pub synthesized_territories: usize,
    /// Units whose proposed agent differs from the current one
    pub reassigned_units: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuous: Option<bool>,
    /// Files written by the run
    pub outputs: Vec<PathBuf>,
}

impl RunReport {
    /// Build a report from a finished allocation.
    pub fn new(
        started_at: DateTime<Utc>,
        input: impl Into<PathBuf>,
        current_agents: usize,
        allocation: &Allocation,
    ) -> Self {
        let units = allocation.table.units();
        let synthesized = allocation
            .mapping
            .iter()
            .filter(|(_, m)| m.source == MappingSource::Synthesized)
            .count();
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            ended_at: Utc::now(),
            input: input.into(),
            total_units: units.len(),
            immutable_units: allocation.table.immutable_count(),
            current_agents,
            kept_agents: allocation.mapping.len() - synthesized,
            synthesized_territories: synthesized,
            reassigned_units: units
                .iter()
                .filter(|u| u.proposed_agent.as_deref() != Some(u.current_agent.as_str()))
                .count(),
            search: allocation.search.as_ref().map(SearchSummary::from),
            continuous: allocation.continuous,
            outputs: Vec::new(),
        }
    }

    pub fn add_output(&mut self, path: impl Into<PathBuf>) {
        self.outputs.push(path.into());
    }

    /// Save the report as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let report = serde_json::from_str(&json)?;
        Ok(report)
    }
}
