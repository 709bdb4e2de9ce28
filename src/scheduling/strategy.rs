// src/scheduling/strategy.rs
//! Candidate selection strategies
//!
//! - **First-fit**: first candidate in score-descending order
//! - **Best-fit**: least leftover capacity after placement
//! - **Worst-fit**: most leftover capacity (spreads load, limits fragmentation)
//! - **Balanced**: highest composite score
//!
//! Leftover ("waste") only counts cpu and memory. Disk, network and custom
//! dimensions do not influence best/worst-fit.

use crate::resources::{Resource, ResourceRequirements};
use crate::scheduling::scoring::{base_score, can_satisfy_requirements, Priority};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    FirstFit,
    BestFit,
    WorstFit,
    #[default]
    Balanced,
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AllocationStrategy::FirstFit => "first_fit",
            AllocationStrategy::BestFit => "best_fit",
            AllocationStrategy::WorstFit => "worst_fit",
            AllocationStrategy::Balanced => "balanced",
        };
        f.write_str(s)
    }
}

/// A candidate with its computed score and waste
#[derive(Debug, Clone)]
pub struct ScoredCandidate<'a> {
    pub resource: &'a Resource,
    pub score: f64,
    pub waste: f64,
}

/// Capacity left on cpu and memory after placing the minimums
pub fn calculate_waste(resource: &Resource, requirements: &ResourceRequirements) -> f64 {
    let min = requirements.minimums();
    let cpu = (resource.available.cpu - min.cpu).max(0.0);
    let memory = (resource.available.memory as f64 - min.memory as f64).max(0.0);
    cpu + memory
}

/// Score every candidate, dropping those that cannot satisfy the request
///
/// The result is sorted by score (descending), ties broken by resource id.
pub fn rank_candidates<'a>(
    candidates: &[&'a Resource],
    requirements: &ResourceRequirements,
    priority: Priority,
) -> Vec<ScoredCandidate<'a>> {
    let mut ranked: Vec<(f64, ScoredCandidate<'a>)> = candidates
        .iter()
        .copied()
        .filter(|resource| can_satisfy_requirements(resource, requirements))
        .map(|resource| {
            let base = base_score(resource);
            let candidate = ScoredCandidate {
                resource,
                score: base * priority.weight(),
                waste: calculate_waste(resource, requirements),
            };
            (base, candidate)
        })
        .collect();

    // Order on the unweighted score so the ranking is identical for every priority
    ranked.sort_by(|(a_base, a), (b_base, b)| {
        b_base
            .total_cmp(a_base)
            .then_with(|| a.resource.id.cmp(&b.resource.id))
    });

    ranked.into_iter().map(|(_, candidate)| candidate).collect()
}

/// Pick one resource from `candidates` according to `strategy`
pub fn select_resource_by_strategy<'a>(
    candidates: &[&'a Resource],
    requirements: &ResourceRequirements,
    priority: Priority,
    strategy: AllocationStrategy,
) -> Option<&'a Resource> {
    let ranked = rank_candidates(candidates, requirements, priority);

    // `ranked` is in score order, so the reductions keep the better-scored
    // candidate on waste ties.
    let chosen = match strategy {
        AllocationStrategy::FirstFit => ranked.first(),
        AllocationStrategy::BestFit => ranked
            .iter()
            .reduce(|best, c| if c.waste.total_cmp(&best.waste) == Ordering::Less { c } else { best }),
        AllocationStrategy::WorstFit => ranked
            .iter()
            .reduce(|best, c| if c.waste.total_cmp(&best.waste) == Ordering::Greater { c } else { best }),
        AllocationStrategy::Balanced => ranked
            .iter()
            .reduce(|best, c| if c.score > best.score { c } else { best }),
    };

    chosen.map(|c| c.resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ResourceLimits, ResourceSpec, ResourceType, GIB};
    use proptest::prelude::*;

    fn resource(id: &str, cpu: f64, memory_gb: u64) -> Resource {
        Resource::new(
            id.to_string(),
            ResourceSpec::new(ResourceType::Compute, id, ResourceLimits::new(cpu, memory_gb * GIB)),
        )
    }

    fn busy(id: &str, cpu: f64, memory_gb: u64, used_cpu: f64, used_gb: u64) -> Resource {
        let mut r = resource(id, cpu, memory_gb);
        r.allocated = ResourceLimits::new(used_cpu, used_gb * GIB);
        r.recompute_availability();
        r
    }

    #[test]
    fn test_waste_only_counts_cpu_and_memory() {
        let mut r = resource("a", 4.0, 8);
        r.capacity.disk = 100 * GIB;
        r.recompute_availability();

        let req = ResourceRequirements::new().cpu(1.0).memory(2 * GIB).disk(10 * GIB);
        let expected = 3.0 + (6 * GIB) as f64;
        assert_eq!(calculate_waste(&r, &req), expected);
    }

    #[test]
    fn test_best_and_worst_fit() {
        let small = resource("small", 2.0, 4);
        let large = resource("large", 16.0, 64);
        let candidates = vec![&small, &large];
        let req = ResourceRequirements::new().cpu(1.0).memory(GIB);

        let best = select_resource_by_strategy(&candidates, &req, Priority::Normal, AllocationStrategy::BestFit);
        assert_eq!(best.unwrap().id, "small");

        let worst = select_resource_by_strategy(&candidates, &req, Priority::Normal, AllocationStrategy::WorstFit);
        assert_eq!(worst.unwrap().id, "large");
    }

    #[test]
    fn test_balanced_and_first_fit_prefer_highest_score() {
        let idle = resource("b-idle", 4.0, 8);
        let loaded = busy("a-loaded", 4.0, 8, 3.0, 6);
        let candidates = vec![&loaded, &idle];
        let req = ResourceRequirements::new().cpu(1.0);

        for strategy in [AllocationStrategy::Balanced, AllocationStrategy::FirstFit] {
            let chosen = select_resource_by_strategy(&candidates, &req, Priority::Normal, strategy);
            assert_eq!(chosen.unwrap().id, "b-idle");
        }
    }

    #[test]
    fn test_unsatisfiable_candidates_are_skipped() {
        let tiny = resource("tiny", 1.0, 1);
        let req = ResourceRequirements::new().cpu(2.0);
        for strategy in [
            AllocationStrategy::FirstFit,
            AllocationStrategy::BestFit,
            AllocationStrategy::WorstFit,
            AllocationStrategy::Balanced,
        ] {
            assert!(select_resource_by_strategy(&[&tiny], &req, Priority::Critical, strategy).is_none());
        }
    }

    #[test]
    fn test_ties_break_by_id() {
        let a = resource("a", 4.0, 8);
        let b = resource("b", 4.0, 8);
        let chosen = select_resource_by_strategy(
            &[&b, &a],
            &ResourceRequirements::new(),
            Priority::Normal,
            AllocationStrategy::Balanced,
        );
        assert_eq!(chosen.unwrap().id, "a");
    }

    proptest! {
        #[test]
        fn prop_ranking_is_priority_invariant(
            loads in proptest::collection::vec((1u32..64, 0u32..100, 1u32..10), 2..8)
        ) {
            let resources: Vec<Resource> = loads
                .iter()
                .enumerate()
                .map(|(i, (cpu, pct, cost))| {
                    let cpu = *cpu as f64;
                    let mut r = busy(&format!("r{:02}", i), cpu, 16, cpu * (*pct as f64) / 100.0, 0);
                    r.cost = *cost as f64;
                    r
                })
                .collect();
            let candidates: Vec<&Resource> = resources.iter().collect();
            let req = ResourceRequirements::new();

            let order = |p: Priority| -> Vec<String> {
                rank_candidates(&candidates, &req, p)
                    .into_iter()
                    .map(|c| c.resource.id.clone())
                    .collect()
            };

            let reference = order(Priority::Critical);
            for priority in Priority::all() {
                prop_assert_eq!(&order(priority), &reference);
            }
        }
    }
}
