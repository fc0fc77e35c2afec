//! Removal ("repair") heuristics.
//!
//! Removing clusters brings an over-full solution back towards feasibility. No
//! method ever removes the last remaining cluster.

use crate::instance::CTOPInstance;
use crate::solution::Solution;
use log::warn;
use ordered_float::OrderedFloat;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepairMethod {
    HighCostRemoval,
    WorstRemoval,
    RandomRemoval,
    TravelTimeSimilarity,
    VehicleTimeSimilarity,
    /// Latest completion in the relaxed schedule first
    LatestArrival,
}

/// What a repair may consult besides the solution itself
#[derive(Debug, Clone, Copy)]
pub struct RepairContext<'a> {
    pub instance: &'a CTOPInstance,
    /// Relaxed completion time per cluster, when the oracle provided them
    pub arrivals: Option<&'a HashMap<usize, f64>>,
}

impl<'a> RepairContext<'a> {
    pub fn new(instance: &'a CTOPInstance) -> Self {
        RepairContext { instance, arrivals: None }
    }

    pub fn with_arrivals(instance: &'a CTOPInstance, arrivals: &'a HashMap<usize, f64>) -> Self {
        RepairContext { instance, arrivals: Some(arrivals) }
    }
}

impl RepairMethod {
    /// The methods that need nothing beyond the instance
    pub const BASIC: [RepairMethod; 5] = [
        RepairMethod::HighCostRemoval,
        RepairMethod::WorstRemoval,
        RepairMethod::RandomRemoval,
        RepairMethod::TravelTimeSimilarity,
        RepairMethod::VehicleTimeSimilarity,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RepairMethod::HighCostRemoval => "high-cost-removal",
            RepairMethod::WorstRemoval => "worst-removal",
            RepairMethod::RandomRemoval => "random-removal",
            RepairMethod::TravelTimeSimilarity => "travel-time-similarity",
            RepairMethod::VehicleTimeSimilarity => "vehicle-time-similarity",
            RepairMethod::LatestArrival => "latest-arrival",
        }
    }

    /// Remove up to `q` clusters from a copy of `solution`, keeping at least one
    pub fn apply<R: Rng>(&self, ctx: &RepairContext<'_>, solution: &Solution, q: usize, rng: &mut R) -> Solution {
        let count = q.min(solution.len().saturating_sub(1));
        if count == 0 {
            return solution.clone();
        }
        let removed = self.select(ctx, solution, count, rng);
        solution.without(&removed)
    }

    fn select<R: Rng>(&self, ctx: &RepairContext<'_>, solution: &Solution, count: usize, rng: &mut R) -> Vec<usize> {
        let instance = ctx.instance;
        let mut ranked: Vec<usize> = solution.clusters().to_vec();
        match self {
            RepairMethod::HighCostRemoval => {
                ranked.sort_by_key(|&c| Reverse(OrderedFloat(instance.cluster(c).cost)));
            }
            RepairMethod::WorstRemoval => {
                ranked.sort_by_key(|&c| OrderedFloat(instance.cluster(c).ratio()));
            }
            RepairMethod::RandomRemoval => {
                ranked.shuffle(rng);
            }
            RepairMethod::TravelTimeSimilarity => {
                let anchor = worst_ratio(instance, &ranked);
                return by_similarity(&ranked, anchor, count, |c| instance.cluster(c).depot_return_ratio);
            }
            RepairMethod::VehicleTimeSimilarity => {
                let anchor = ranked[rng.gen_range(0..ranked.len())];
                let Some(streak) = instance.cluster(anchor).longest_streak() else {
                    warn!("no vehicle can serve anchor cluster {}, removing it alone", anchor);
                    return vec![anchor];
                };
                let vehicle = streak.vehicle;
                return by_similarity(&ranked, anchor, count, |c| instance.cluster(c).service_share(vehicle));
            }
            RepairMethod::LatestArrival => match ctx.arrivals {
                Some(arrivals) => {
                    ranked.sort_by_key(|c| Reverse(OrderedFloat(arrivals.get(c).copied().unwrap_or(f64::INFINITY))));
                }
                None => {
                    warn!("no relaxed arrival times available, ranking by cost");
                    ranked.sort_by_key(|&c| Reverse(OrderedFloat(instance.cluster(c).cost)));
                }
            },
        }
        ranked.truncate(count);
        ranked
    }
}

fn worst_ratio(instance: &CTOPInstance, clusters: &[usize]) -> usize {
    let mut worst = clusters[0];
    for &c in &clusters[1..] {
        if instance.cluster(c).ratio() < instance.cluster(worst).ratio() {
            worst = c;
        }
    }
    worst
}

/// The anchor followed by the `count - 1` clusters whose feature is closest to the anchor's
fn by_similarity<F: Fn(usize) -> f64>(clusters: &[usize], anchor: usize, count: usize, feature: F) -> Vec<usize> {
    let reference = feature(anchor);
    let mut rest: Vec<usize> = clusters.iter().copied().filter(|&c| c != anchor).collect();
    rest.sort_by_key(|&c| OrderedFloat((feature(c) - reference).abs()));
    rest.truncate(count.saturating_sub(1));

    let mut removed = Vec::with_capacity(rest.len() + 1);
    removed.push(anchor);
    removed.extend(rest);
    removed
}

impl std::fmt::Display for RepairMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::create_test_instance;
    use crate::instance::{CTOPInstance, ClusterData, Node, Vehicle};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const ALL: [RepairMethod; 6] = [
        RepairMethod::HighCostRemoval,
        RepairMethod::WorstRemoval,
        RepairMethod::RandomRemoval,
        RepairMethod::TravelTimeSimilarity,
        RepairMethod::VehicleTimeSimilarity,
        RepairMethod::LatestArrival,
    ];

    #[test]
    fn test_never_removes_last_cluster() {
        let instance = create_test_instance();
        let ctx = RepairContext::new(&instance);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        for method in ALL {
            for size in 1..=4 {
                let solution = Solution::from_clusters(0..size);
                for q in 0..6 {
                    let out = method.apply(&ctx, &solution, q, &mut rng);
                    assert!(!out.is_empty(), "{} q={} size={}", method, q, size);
                    let expected = size - q.min(size - 1);
                    // an unservable anchor (cluster 3) is removed alone
                    if method == RepairMethod::VehicleTimeSimilarity {
                        assert!(out.len() >= expected && out.len() <= size);
                    } else {
                        assert_eq!(out.len(), expected, "{} q={} size={}", method, q, size);
                    }
                    assert!(out.iter().all(|c| solution.contains(c)));
                }
            }
        }
    }

    #[test]
    fn test_cost_and_ratio_rankings() {
        let instance = create_test_instance();
        let ctx = RepairContext::new(&instance);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let solution = Solution::from_clusters([0, 1, 2, 3]);

        let out = RepairMethod::HighCostRemoval.apply(&ctx, &solution, 1, &mut rng);
        assert_eq!(out.clusters(), &[1, 2, 3]);

        let out = RepairMethod::WorstRemoval.apply(&ctx, &solution, 2, &mut rng);
        assert_eq!(out.clusters(), &[0, 3]);
    }

    #[test]
    fn test_travel_time_similarity() {
        let instance = create_test_instance();
        let ctx = RepairContext::new(&instance);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let solution = Solution::from_clusters([0, 1, 2, 3]);

        // anchor is cluster 2 (worst ratio); cluster 3 has the closest depot/return ratio
        let out = RepairMethod::TravelTimeSimilarity.apply(&ctx, &solution, 2, &mut rng);
        assert_eq!(out.clusters(), &[0, 1]);
    }

    #[test]
    fn test_vehicle_similarity_with_unservable_anchor() {
        let nodes = vec![
            Node::waypoint(0, 0.0, 0.0),
            Node::waypoint(1, 4.0, 0.0),
            Node::new(2, 1.0, 1.0, Some(9), 1.0),
            Node::new(3, 2.0, 1.0, Some(9), 1.0),
        ];
        let vehicles = vec![Vehicle::new(0, [1])];
        let clusters = vec![
            ClusterData { nodes: vec![2], profit: 1.0 },
            ClusterData { nodes: vec![3], profit: 1.0 },
        ];
        let instance = CTOPInstance::new("unservable", nodes, vehicles, clusters, 0, 1, 10.0).unwrap();
        let ctx = RepairContext::new(&instance);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let solution = Solution::from_clusters([0, 1]);

        let out = RepairMethod::VehicleTimeSimilarity.apply(&ctx, &solution, 5, &mut rng);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_latest_arrival_uses_relaxed_times() {
        let instance = create_test_instance();
        let arrivals: HashMap<usize, f64> = [(0, 12.0), (1, 30.0), (2, 20.0)].into_iter().collect();
        let ctx = RepairContext::with_arrivals(&instance, &arrivals);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let solution = Solution::from_clusters([0, 1, 2]);

        let out = RepairMethod::LatestArrival.apply(&ctx, &solution, 2, &mut rng);
        assert_eq!(out.clusters(), &[0]);
    }
}
