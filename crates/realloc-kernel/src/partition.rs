//! Spatial partitioning: split unit coordinates into k compact groups.
//!
//! The default partitioner is seeded k-means (k-means++ initialisation,
//! Lloyd iterations, several restarts keeping the lowest inertia). All
//! randomness comes from a `ChaCha8Rng`, so a fixed seed reproduces the
//! partition exactly.
//!
//! Partitions carry no notion of contiguity or administrative containers;
//! see [`crate::containment`] for the repair passes.

use std::collections::{BTreeSet, HashMap};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PartitionerConfig;
use crate::error::{ReallocationError, ReallocationResult};
use crate::unit::Coordinates;

/// Identifier of a group (cluster) within one partition.
pub type GroupId = usize;

/// Group assignment per unit, in table order. `None` marks an unclustered unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    groups: Vec<Option<GroupId>>,
}

impl Partition {
    pub fn new(groups: Vec<Option<GroupId>>) -> Self {
        Self { groups }
    }

    /// Every unit clustered.
    pub fn from_groups(groups: Vec<GroupId>) -> Self {
        Self::new(groups.into_iter().map(Some).collect())
    }

    /// No unit clustered.
    pub fn unclustered(len: usize) -> Self {
        Self::new(vec![None; len])
    }

    pub fn get(&self, index: usize) -> Option<GroupId> {
        self.groups.get(index).copied().flatten()
    }

    pub fn set(&mut self, index: usize, group: Option<GroupId>) {
        if let Some(slot) = self.groups.get_mut(index) {
            *slot = group;
        }
    }

    pub fn as_slice(&self) -> &[Option<GroupId>] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Distinct group ids in ascending order.
    pub fn group_ids(&self) -> BTreeSet<GroupId> {
        self.groups.iter().flatten().copied().collect()
    }

    pub fn group_count(&self) -> usize {
        self.group_ids().len()
    }

    /// Indices of the units assigned to `group`.
    pub fn members(&self, group: GroupId) -> Vec<usize> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, g)| **g == Some(group))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn unclustered_count(&self) -> usize {
        self.groups.iter().filter(|g| g.is_none()).count()
    }
}

/// Splits points into `k` groups.
///
/// Implementations must be deterministic for a given configuration and
/// require `1 <= k <= points.len()`; callers clamp before calling.
pub trait Partitioner {
    fn partition(&self, points: &[Coordinates], k: usize) -> ReallocationResult<Vec<GroupId>>;
}

/// Seeded k-means partitioner.
#[derive(Debug, Clone)]
pub struct KMeansPartitioner {
    config: PartitionerConfig,
}

impl KMeansPartitioner {
    pub fn new(config: PartitionerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PartitionerConfig {
        &self.config
    }

    /// One k-means++ seeding followed by Lloyd iterations.
    fn run_once(
        &self,
        points: &[Coordinates],
        k: usize,
        rng: &mut ChaCha8Rng,
    ) -> (Vec<GroupId>, f64, usize) {
        let mut centroids = seed_centroids(points, k, rng);
        let mut assignments = vec![0; points.len()];
        let mut iterations = 0;

        for _ in 0..self.config.max_iterations.max(1) {
            iterations += 1;
            assign(points, &centroids, &mut assignments);
            let updated = recompute_centroids(points, &assignments, &centroids);

            let shift = centroids
                .iter()
                .zip(&updated)
                .map(|(old, new)| old.distance_squared(new).sqrt())
                .fold(0.0_f64, f64::max);

            centroids = updated;
            if shift <= self.config.tolerance {
                break;
            }
        }

        let inertia = assign(points, &centroids, &mut assignments);
        (assignments, inertia, iterations)
    }
}

impl Default for KMeansPartitioner {
    fn default() -> Self {
        Self::new(PartitionerConfig::default())
    }
}

impl Partitioner for KMeansPartitioner {
    fn partition(&self, points: &[Coordinates], k: usize) -> ReallocationResult<Vec<GroupId>> {
        if k == 0 || k > points.len() {
            return Err(ReallocationError::InvalidGroupCount {
                k,
                points: points.len(),
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut best: Option<(Vec<GroupId>, f64)> = None;

        for restart in 0..self.config.restarts.max(1) {
            let (assignments, inertia, iterations) = self.run_once(points, k, &mut rng);
            debug!(restart, iterations, inertia, k, "k-means restart finished");
            if best.as_ref().is_none_or(|(_, best_inertia)| inertia < *best_inertia) {
                best = Some((assignments, inertia));
            }
        }

        let (assignments, _) = best.unwrap_or_default();
        Ok(canonical_labels(&assignments))
    }
}

/// Nearest centroid index and its squared distance; ties go to the lowest index.
fn nearest(point: &Coordinates, centroids: &[Coordinates]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(best, best_d), (i, c)| {
            let d = point.distance_squared(c);
            if d < best_d { (i, d) } else { (best, best_d) }
        })
}

/// Assign every point to its nearest centroid, returning the inertia.
fn assign(points: &[Coordinates], centroids: &[Coordinates], assignments: &mut [usize]) -> f64 {
    let mut inertia = 0.0;
    for (slot, point) in assignments.iter_mut().zip(points) {
        let (group, d) = nearest(point, centroids);
        *slot = group;
        inertia += d;
    }
    inertia
}

/// k-means++: first centre uniform, later centres weighted by squared distance.
fn seed_centroids(points: &[Coordinates], k: usize, rng: &mut ChaCha8Rng) -> Vec<Coordinates> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.random_range(0..points.len())]);

    let mut min_distances: Vec<f64> = points
        .iter()
        .map(|p| p.distance_squared(&centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = min_distances.iter().sum();
        let next = if total > 0.0 {
            let mut threshold = rng.random::<f64>() * total;
            let mut chosen = points.len() - 1;
            for (i, d) in min_distances.iter().enumerate() {
                if *d <= 0.0 {
                    continue;
                }
                if threshold < *d {
                    chosen = i;
                    break;
                }
                threshold -= d;
            }
            chosen
        } else {
            // Every point sits on a centre already.
            rng.random_range(0..points.len())
        };

        let centre = points[next];
        for (d, p) in min_distances.iter_mut().zip(points) {
            *d = d.min(p.distance_squared(&centre));
        }
        centroids.push(centre);
    }

    centroids
}

/// Mean of each group's points. Empty groups are moved onto the point that is
/// currently worst served, so all k groups stay populated where possible.
fn recompute_centroids(
    points: &[Coordinates],
    assignments: &[usize],
    previous: &[Coordinates],
) -> Vec<Coordinates> {
    let k = previous.len();
    let mut sums = vec![(0.0_f64, 0.0_f64); k];
    let mut counts = vec![0usize; k];

    for (point, &group) in points.iter().zip(assignments) {
        sums[group].0 += point.latitude;
        sums[group].1 += point.longitude;
        counts[group] += 1;
    }

    let mut taken: Vec<usize> = Vec::new();
    let mut centroids = Vec::with_capacity(k);
    for group in 0..k {
        if counts[group] > 0 {
            let n = counts[group] as f64;
            centroids.push(Coordinates {
                latitude: sums[group].0 / n,
                longitude: sums[group].1 / n,
            });
            continue;
        }

        let farthest = points
            .iter()
            .enumerate()
            .filter(|(i, _)| !taken.contains(i))
            .map(|(i, p)| (i, p.distance_squared(&previous[assignments[i]])))
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, best_d)) if best_d >= d => best,
                _ => Some((i, d)),
            });

        match farthest {
            Some((i, _)) => {
                taken.push(i);
                centroids.push(points[i]);
            }
            None => centroids.push(previous[group]),
        }
    }

    centroids
}

/// Renumber groups in order of first appearance so equal partitions compare equal.
fn canonical_labels(assignments: &[usize]) -> Vec<GroupId> {
    let mut mapping: HashMap<usize, GroupId> = HashMap::new();
    assignments
        .iter()
        .map(|raw| {
            let next = mapping.len();
            *mapping.entry(*raw).or_insert(next)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(center: (f64, f64), n: usize) -> Vec<Coordinates> {
        (0..n)
            .map(|i| Coordinates {
                latitude: center.0 + (i % 3) as f64 * 0.01,
                longitude: center.1 + (i / 3) as f64 * 0.01,
            })
            .collect()
    }

    #[test]
    fn test_separates_distant_blobs() {
        let mut points = blob((-27.0, -52.0), 6);
        points.extend(blob((-20.0, -45.0), 6));

        let groups = KMeansPartitioner::default().partition(&points, 2).unwrap();

        assert!(groups[..6].iter().all(|g| *g == 0));
        assert!(groups[6..].iter().all(|g| *g == 1));
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let mut points = blob((0.0, 0.0), 9);
        points.extend(blob((0.05, 0.05), 9));
        points.extend(blob((1.0, 1.0), 9));

        let partitioner = KMeansPartitioner::default();
        let a = partitioner.partition(&points, 4).unwrap();
        let b = partitioner.partition(&points, 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_invalid_group_count() {
        let points = blob((0.0, 0.0), 3);
        let partitioner = KMeansPartitioner::default();

        assert_eq!(
            partitioner.partition(&points, 0),
            Err(ReallocationError::InvalidGroupCount { k: 0, points: 3 })
        );
        assert!(partitioner.partition(&points, 4).is_err());
    }

    #[test]
    fn test_k_equal_to_points_gives_singletons() {
        let points = blob((0.0, 0.0), 5);
        let groups = KMeansPartitioner::default().partition(&points, 5).unwrap();
        let distinct: BTreeSet<_> = groups.iter().collect();
        assert_eq!(distinct.len(), 5);
    }

    #[test]
    fn test_labels_are_canonical() {
        assert_eq!(canonical_labels(&[2, 2, 0, 1, 0]), vec![0, 0, 1, 2, 1]);
    }

    #[test]
    fn test_partition_helpers() {
        let partition = Partition::new(vec![Some(1), None, Some(0), Some(1)]);
        assert_eq!(partition.group_ids().into_iter().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(partition.members(1), vec![0, 3]);
        assert_eq!(partition.unclustered_count(), 1);
        assert_eq!(partition.get(1), None);
    }
}
