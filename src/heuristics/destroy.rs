//! Insertion ("destroy") heuristics.
//!
//! Adding clusters to a solution destroys its feasibility. Every method draws the
//! same candidate pool from the roulette and differs only in how it ranks it.

use crate::alns::distribution::WeightedDistribution;
use crate::alns::roulette::ClusterRoulette;
use crate::instance::CTOPInstance;
use crate::solution::Solution;
use log::warn;
use ordered_float::OrderedFloat;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestroyMethod {
    /// Highest profit first
    GreedyProfit,
    /// Lowest cost first
    GreedyCost,
    /// Highest profit/cost ratio first
    GreedyBestRatio,
    RandomInsertion,
}

impl DestroyMethod {
    pub const ALL: [DestroyMethod; 4] = [
        DestroyMethod::GreedyProfit,
        DestroyMethod::GreedyCost,
        DestroyMethod::GreedyBestRatio,
        DestroyMethod::RandomInsertion,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DestroyMethod::GreedyProfit => "greedy-profit",
            DestroyMethod::GreedyCost => "greedy-cost",
            DestroyMethod::GreedyBestRatio => "greedy-best-ratio",
            DestroyMethod::RandomInsertion => "random-insertion",
        }
    }

    /// Append up to `q` roulette candidates to a copy of `solution`.
    ///
    /// With no candidate left after every fallback the input comes back unchanged.
    pub fn apply<R: Rng>(
        &self,
        instance: &CTOPInstance,
        roulette: &ClusterRoulette,
        nerf_barrier: f64,
        solution: &Solution,
        q: usize,
        rng: &mut R,
    ) -> Solution {
        let pool = roulette.candidates(solution, nerf_barrier, rng);
        if pool.is_empty() {
            warn!("{}: empty candidate pool, solution left unchanged", self.label());
            return solution.clone();
        }
        let chosen = self.select(instance, pool, q, rng);
        solution.with(&chosen)
    }

    /// The first `min(q, |pool|)` clusters of `pool` under this method's ranking
    pub fn select<R: Rng>(&self, instance: &CTOPInstance, mut pool: Vec<usize>, q: usize, rng: &mut R) -> Vec<usize> {
        let q = q.min(pool.len());
        match self {
            DestroyMethod::GreedyProfit => {
                pool.sort_by_key(|&c| Reverse(OrderedFloat(instance.cluster(c).profit)));
            }
            DestroyMethod::GreedyCost => {
                pool.sort_by_key(|&c| OrderedFloat(instance.cluster(c).cost));
            }
            DestroyMethod::GreedyBestRatio => {
                pool.sort_by_key(|&c| Reverse(OrderedFloat(instance.cluster(c).ratio())));
            }
            DestroyMethod::RandomInsertion => {
                let mut wheel = WeightedDistribution::new();
                for &c in &pool {
                    wheel.add(c, &c.to_string());
                }
                let mut drawn = Vec::with_capacity(q);
                while drawn.len() < q {
                    let Some(&c) = wheel.draw(rng) else { break };
                    wheel.remove(&c);
                    drawn.push(c);
                }
                return drawn;
            }
        }
        pool.truncate(q);
        pool
    }
}

impl std::fmt::Display for DestroyMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
