//! Containment repair: keep administrative containers inside a single group.
//!
//! Nuclei must never be split across agents; microregions should not be.
//! Both are repaired the same way: every member of a container is moved to
//! the container's majority group. Nuclei are repaired first so the
//! microregion vote sees nucleus-corrected groups.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::config::NO_MICROREGION;
use crate::partition::{GroupId, Partition};
use crate::unit::GeographicUnit;

/// Repairs nucleus and microregion splits in a partition.
#[derive(Debug, Clone)]
pub struct ContainmentEnforcer {
    no_microregion: String,
}

/// Outcome of one containment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Containers that were split and have been merged
    pub repaired: usize,
    /// Units whose group changed
    pub moved: usize,
    /// Containers left alone because none of their units were clustered
    pub skipped: usize,
}

impl ContainmentEnforcer {
    pub fn new(no_microregion: impl Into<String>) -> Self {
        Self {
            no_microregion: no_microregion.into(),
        }
    }

    /// Nucleus pass, then microregion pass, on a copy of `partition`.
    pub fn enforce(&self, partition: &Partition, units: &[GeographicUnit]) -> Partition {
        let mut repaired = partition.clone();
        let nuclei = self.enforce_nuclei(&mut repaired, units);
        let microregions = self.enforce_microregions(&mut repaired, units);
        info!(
            nuclei_repaired = nuclei.repaired,
            microregions_repaired = microregions.repaired,
            units_moved = nuclei.moved + microregions.moved,
            "Containment enforced"
        );
        repaired
    }

    /// Move every unit of each nucleus into the nucleus's majority group.
    pub fn enforce_nuclei(&self, partition: &mut Partition, units: &[GeographicUnit]) -> PassStats {
        repair_containers(partition, units, "nucleus", |u| Some(u.nucleus_id.as_str()))
    }

    /// Same as [`Self::enforce_nuclei`] for microregions, skipping the
    /// "no microregion" sentinel entirely.
    pub fn enforce_microregions(
        &self,
        partition: &mut Partition,
        units: &[GeographicUnit],
    ) -> PassStats {
        repair_containers(partition, units, "microregion", |u| {
            (u.microregion_id != self.no_microregion).then_some(u.microregion_id.as_str())
        })
    }
}

impl Default for ContainmentEnforcer {
    fn default() -> Self {
        Self::new(NO_MICROREGION)
    }
}

fn repair_containers<'a>(
    partition: &mut Partition,
    units: &'a [GeographicUnit],
    kind: &str,
    container_of: impl Fn(&'a GeographicUnit) -> Option<&'a str>,
) -> PassStats {
    let mut order: Vec<&str> = Vec::new();
    let mut members: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, unit) in units.iter().enumerate() {
        if let Some(container) = container_of(unit) {
            members
                .entry(container)
                .or_insert_with(|| {
                    order.push(container);
                    Vec::new()
                })
                .push(index);
        }
    }

    let mut stats = PassStats::default();
    for container in order {
        let indices = &members[container];
        let Some(target) = majority_group(partition, indices) else {
            warn!(
                kind,
                container,
                units = indices.len(),
                "Container has no clustered units; leaving its groups unchanged"
            );
            stats.skipped += 1;
            continue;
        };

        let moved = indices
            .iter()
            .filter(|&&i| partition.get(i) != Some(target))
            .count();
        if moved > 0 {
            for &i in indices {
                partition.set(i, Some(target));
            }
            stats.repaired += 1;
            stats.moved += moved;
        }
    }
    stats
}

/// Most frequent clustered group among `indices`; ties go to the group seen first.
fn majority_group(partition: &Partition, indices: &[usize]) -> Option<GroupId> {
    let mut counts: Vec<(GroupId, usize)> = Vec::new();
    for group in indices.iter().filter_map(|&i| partition.get(i)) {
        match counts.iter_mut().find(|(g, _)| *g == group) {
            Some((_, count)) => *count += 1,
            None => counts.push((group, 1)),
        }
    }

    let mut best: Option<(GroupId, usize)> = None;
    for (group, count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((group, count));
        }
    }
    best.map(|(group, _)| group)
}
