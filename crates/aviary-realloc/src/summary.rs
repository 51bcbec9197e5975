//! Per-agent summary of a proposed allocation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use realloc_kernel::UnitTable;

use crate::loader::DELIMITER;

/// Workload of one proposed agent compared with the same identity today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent: String,
    /// Distinct producer names among the proposed units
    pub unique_producers: usize,
    pub proposed_units: usize,
    /// Units this identity serves today; 0 for synthesized territories
    pub current_units: usize,
    /// `proposed_units - current_units`
    pub delta: i64,
}

/// Summarize `table` by proposed agent.
///
/// Sorted by unique producers, descending; ties by agent name. Units
/// without a proposal are not counted.
pub fn summarize(table: &UnitTable) -> Vec<AgentSummary> {
    let mut current: HashMap<&str, usize> = HashMap::new();
    for unit in table.units() {
        *current.entry(unit.current_agent.as_str()).or_default() += 1;
    }

    let mut proposed: BTreeMap<&str, (HashSet<&str>, usize)> = BTreeMap::new();
    let mut unassigned = 0;
    for unit in table.units() {
        let Some(agent) = unit.proposed_agent.as_deref() else {
            unassigned += 1;
            continue;
        };
        let (producers, count) = proposed.entry(agent).or_default();
        producers.insert(unit.producer_name.as_str());
        *count += 1;
    }
    if unassigned > 0 {
        warn!(units = unassigned, "Units without a proposed agent left out of the summary");
    }

    let mut summaries: Vec<AgentSummary> = proposed
        .into_iter()
        .map(|(agent, (producers, proposed_units))| {
            let current_units = current.get(agent).copied().unwrap_or(0);
            AgentSummary {
                agent: agent.to_string(),
                unique_producers: producers.len(),
                proposed_units,
                current_units,
                delta: proposed_units as i64 - current_units as i64,
            }
        })
        .collect();
    summaries.sort_by(|a, b| {
        b.unique_producers
            .cmp(&a.unique_producers)
            .then_with(|| a.agent.cmp(&b.agent))
    });
    summaries
}

/// Write summaries as a `;`-delimited CSV.
pub fn write_summary(path: impl AsRef<Path>, summaries: &[AgentSummary]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for summary in summaries {
        writer.serialize(summary)?;
    }
    writer.flush()?;

    info!(file = %path.display(), agents = summaries.len(), "Agent summary exported");
    Ok(())
}
