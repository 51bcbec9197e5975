//! Agent mapping: turn anonymous groups into agent territories.
//!
//! Groups are matched to current agents by majority so that most units keep
//! their agent. Groups that cannot keep one get a leftover current agent, and
//! any groups beyond that get a synthesized label. Immutable units always
//! keep their current agent, whatever their group was mapped to.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::partition::{GroupId, Partition};
use crate::unit::{GeographicUnit, UnitTable};

/// How a group obtained its agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    /// The group's majority current agent
    Continuity,
    /// A current agent left over after continuity claims
    Reassigned,
    /// A new territory label
    Synthesized,
}

/// Agent assigned to one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedAgent {
    pub agent: String,
    pub source: MappingSource,
}

/// Group id to agent identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMapping {
    entries: BTreeMap<GroupId, MappedAgent>,
}

impl AgentMapping {
    pub fn get(&self, group: GroupId) -> Option<&str> {
        self.entries.get(&group).map(|m| m.agent.as_str())
    }

    pub fn source(&self, group: GroupId) -> Option<MappingSource> {
        self.entries.get(&group).map(|m| m.source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (GroupId, &MappedAgent)> {
        self.entries.iter().map(|(g, m)| (*g, m))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, group: GroupId, agent: String, source: MappingSource) {
        debug!(group, agent = %agent, source = ?source, "Group mapped");
        self.entries.insert(group, MappedAgent { agent, source });
    }

    fn contains(&self, group: GroupId) -> bool {
        self.entries.contains_key(&group)
    }
}

/// Sequence of territory labels: `A`..`Z`, then `AA`, `AB`, ...
#[derive(Debug, Clone)]
pub struct RegionLabels {
    prefix: String,
    next: usize,
}

impl RegionLabels {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }
}

impl Iterator for RegionLabels {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let index = self.next;
        self.next += 1;
        if index == 26 {
            warn!(
                prefix = %self.prefix,
                "Single-letter territory labels exhausted; continuing with two-letter labels"
            );
        }
        Some(format!("{} {}", self.prefix, letters(index)))
    }
}

/// Bijective base-26: 0 -> A, 25 -> Z, 26 -> AA.
fn letters(index: usize) -> String {
    let mut n = index + 1;
    let mut out = String::new();
    while n > 0 {
        n -= 1;
        out.insert(0, char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }
    out
}

/// Maps groups onto agent identities and writes proposals.
#[derive(Debug, Clone)]
pub struct AgentMapper {
    label_prefix: String,
}

impl AgentMapper {
    pub fn new(label_prefix: impl Into<String>) -> Self {
        Self {
            label_prefix: label_prefix.into(),
        }
    }

    /// Choose one agent per group.
    ///
    /// Groups are visited in ascending id order. No two groups receive the
    /// same current agent, and synthesized labels never reuse a current
    /// agent's name.
    pub fn assign(
        &self,
        partition: &Partition,
        units: &[GeographicUnit],
        current_agents: &[String],
    ) -> AgentMapping {
        let known: BTreeSet<&str> = current_agents.iter().map(String::as_str).collect();
        let groups = partition.group_ids();
        let mut claimed: HashSet<&str> = HashSet::new();
        let mut mapping = AgentMapping::default();

        for &group in &groups {
            let members = partition.members(group);
            let Some(agent) = majority_agent(units, &members) else {
                continue;
            };
            if known.contains(agent) && claimed.insert(agent) {
                mapping.insert(group, agent.to_string(), MappingSource::Continuity);
            }
        }

        let mut leftovers = known.iter().filter(|a| !claimed.contains(*a));
        let mut labels = RegionLabels::new(self.label_prefix.clone())
            .filter(|label| !known.contains(label.as_str()));

        for &group in &groups {
            if mapping.contains(group) {
                continue;
            }
            if let Some(agent) = leftovers.next() {
                mapping.insert(group, agent.to_string(), MappingSource::Reassigned);
            } else if let Some(label) = labels.next() {
                mapping.insert(group, label, MappingSource::Synthesized);
            }
        }

        let synthesized = mapping
            .iter()
            .filter(|(_, m)| m.source == MappingSource::Synthesized)
            .count();
        info!(
            groups = groups.len(),
            kept = claimed.len(),
            synthesized,
            "Groups mapped to agents"
        );
        mapping
    }

    /// Copy of `table` with proposed agents written from `mapping`.
    ///
    /// Immutable units are then forced back to their current agent; this is
    /// the last write to the proposal. Unclustered units keep their current
    /// agent.
    pub fn apply(&self, table: &UnitTable, partition: &Partition, mapping: &AgentMapping) -> UnitTable {
        let mut result = table.clone();
        let mut unmapped = 0;

        for (index, unit) in result.units_mut().iter_mut().enumerate() {
            let proposed = partition.get(index).and_then(|g| mapping.get(g));
            unit.proposed_agent = match proposed {
                Some(agent) => Some(agent.to_string()),
                None => {
                    unmapped += 1;
                    Some(unit.current_agent.clone())
                }
            };
        }
        if unmapped > 0 {
            warn!(units = unmapped, "Units without a mapped group keep their current agent");
        }

        let mut overridden = 0;
        for unit in result.units_mut().iter_mut().filter(|u| u.immutable) {
            if unit.proposed_agent.as_deref() != Some(unit.current_agent.as_str()) {
                overridden += 1;
            }
            unit.proposed_agent = Some(unit.current_agent.clone());
        }
        info!(overridden, "Immutable allocations restored");

        result
    }
}

impl Default for AgentMapper {
    fn default() -> Self {
        Self::new("Region")
    }
}

/// Most frequent current agent among the movable units in `members`;
/// ties go to the lexically smallest agent.
fn majority_agent<'a>(units: &'a [GeographicUnit], members: &[usize]) -> Option<&'a str> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for unit in members.iter().filter_map(|&i| units.get(i)).filter(|u| !u.immutable) {
        *counts.entry(unit.current_agent.as_str()).or_default() += 1;
    }

    // Ascending key order, so only a strictly larger count replaces the best.
    let mut best: Option<(&str, usize)> = None;
    for (agent, count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((agent, count));
        }
    }
    best.map(|(agent, _)| agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Coordinates;

    fn unit(id: &str, agent: &str) -> GeographicUnit {
        GeographicUnit::new(id, id, "M", Coordinates::new(0.0, 0.0), "P", agent)
    }

    fn agents(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_letters() {
        assert_eq!(letters(0), "A");
        assert_eq!(letters(25), "Z");
        assert_eq!(letters(26), "AA");
        assert_eq!(letters(27), "AB");
        assert_eq!(letters(26 + 26 * 26), "AAA");
    }

    #[test]
    fn test_majority_agent_keeps_group() {
        let units = vec![unit("A0", "Ana"), unit("A1", "Ana"), unit("A2", "Bruno"), unit("A3", "Bruno")];
        let partition = Partition::from_groups(vec![0, 0, 1, 1]);

        let mapping = AgentMapper::default().assign(&partition, &units, &agents(&["Ana", "Bruno"]));

        assert_eq!(mapping.get(0), Some("Ana"));
        assert_eq!(mapping.get(1), Some("Bruno"));
        assert_eq!(mapping.source(1), Some(MappingSource::Continuity));
    }

    #[test]
    fn test_tied_majority_goes_to_smallest_name() {
        let units = vec![unit("A0", "Bruno"), unit("A1", "Ana")];
        let partition = Partition::from_groups(vec![0, 0]);

        let mapping = AgentMapper::default().assign(&partition, &units, &agents(&["Ana", "Bruno"]));

        assert_eq!(mapping.get(0), Some("Ana"));
        assert_eq!(mapping.source(0), Some(MappingSource::Continuity));
    }

    #[test]
    fn test_contested_agent_goes_to_lowest_group() {
        let units = vec![unit("A0", "Ana"), unit("A1", "Ana")];
        let partition = Partition::from_groups(vec![0, 1]);

        let mapping = AgentMapper::default().assign(&partition, &units, &agents(&["Ana"]));

        assert_eq!(mapping.get(0), Some("Ana"));
        assert_eq!(mapping.get(1), Some("Region A"));
        assert_eq!(mapping.source(1), Some(MappingSource::Synthesized));
    }

    #[test]
    fn test_leftover_agents_assigned_lexically() {
        let units = vec![unit("A0", "Ana"), unit("A1", "Ana"), unit("A2", "Ana")];
        let partition = Partition::from_groups(vec![0, 1, 2]);

        let mapping =
            AgentMapper::default().assign(&partition, &units, &agents(&["Zeca", "Ana", "Carla"]));

        assert_eq!(mapping.get(0), Some("Ana"));
        assert_eq!(mapping.get(1), Some("Carla"));
        assert_eq!(mapping.get(2), Some("Zeca"));
        assert_eq!(mapping.source(2), Some(MappingSource::Reassigned));
    }

    #[test]
    fn test_immutable_units_do_not_vote() {
        let mut units = vec![unit("A0", "Ana"), unit("A1", "Ana"), unit("A2", "Bruno")];
        units[0].immutable = true;
        units[1].immutable = true;
        let partition = Partition::from_groups(vec![0, 0, 0]);

        let mapping = AgentMapper::default().assign(&partition, &units, &agents(&["Ana", "Bruno"]));

        assert_eq!(mapping.get(0), Some("Bruno"));
    }

    #[test]
    fn test_unknown_majority_is_not_claimed() {
        let units = vec![unit("A0", "Ghost"), unit("A1", "Ana")];
        let partition = Partition::from_groups(vec![0, 1]);

        let mapping = AgentMapper::default().assign(&partition, &units, &agents(&["Ana"]));

        assert_eq!(mapping.get(1), Some("Ana"));
        assert_eq!(mapping.get(0), Some("Region A"));
    }

    #[test]
    fn test_labels_skip_existing_agent_names() {
        let units = vec![unit("A0", "Region A"), unit("A1", "Region A")];
        let partition = Partition::from_groups(vec![0, 1]);

        let mapping = AgentMapper::default().assign(&partition, &units, &agents(&["Region A"]));

        assert_eq!(mapping.get(0), Some("Region A"));
        assert_eq!(mapping.get(1), Some("Region B"));
    }

    #[test]
    fn test_apply_overrides_immutable_units() {
        let mut units = vec![unit("A0", "Ana"), unit("A1", "Bruno"), unit("A2", "Ana")];
        units[1].immutable = true;
        let table = UnitTable::from_units(units);
        let partition = Partition::from_groups(vec![0, 0, 0]);
        let mapper = AgentMapper::default();
        let mapping = mapper.assign(&partition, table.units(), &agents(&["Ana", "Bruno"]));

        let result = mapper.apply(&table, &partition, &mapping);

        let proposed: Vec<_> = result.units().iter().map(|u| u.proposed_agent.as_deref()).collect();
        assert_eq!(proposed, vec![Some("Ana"), Some("Bruno"), Some("Ana")]);
    }

    #[test]
    fn test_apply_keeps_current_agent_for_unclustered_units() {
        let table = UnitTable::from_units(vec![unit("A0", "Ana")]);
        let partition = Partition::unclustered(1);

        let result = AgentMapper::default().apply(&table, &partition, &AgentMapping::default());

        assert_eq!(result.units()[0].proposed_agent.as_deref(), Some("Ana"));
    }
}
