//! List-scheduling oracle for the CTOP.
//!
//! Clusters are scheduled one after the other. Inside a cluster, the next
//! unserved node goes to the vehicle able to serve the longest contiguous run
//! of the remaining nodes without breaking its time budget (earliest finish on
//! ties). A node may not start before its predecessor in the cluster finished,
//! which is how precedence across vehicles is enforced. A candidate set is
//! feasible if any of a bounded number of cluster orderings schedules.

use super::{FeasibilityOracle, FeasibilityResult, LocalSearchResult};
use crate::error::OracleError;
use crate::instance::CTOPInstance;
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

const EPS: f64 = 1e-9;

/// Orderings tried per feasibility check during local search
const LOCAL_SEARCH_BUDGET: usize = 8;

#[derive(Debug, Clone, Copy)]
struct VehicleState {
    position: usize,
    time: f64,
}

/// A successful schedule of a cluster sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    /// (cluster, completion time) in scheduling order
    pub completion: Vec<(usize, f64)>,
    /// Time each vehicle finishes its last service
    pub vehicle_times: Vec<f64>,
}

/// Counters for the oracle's workload
#[derive(Debug, Clone, Default, Serialize)]
pub struct OracleStats {
    pub feasibility_calls: usize,
    pub memo_hits: usize,
    pub schedules_built: usize,
    pub local_searches: usize,
}

/// Built-in feasibility oracle
pub struct ScheduleOracle<'a> {
    instance: &'a CTOPInstance,
    /// Infeasible sets and the ordering budget they were tried with
    infeasible: HashMap<Vec<usize>, usize>,
    feasible: HashMap<Vec<usize>, f64>,
    stats: OracleStats,
}

impl<'a> ScheduleOracle<'a> {
    pub fn new(instance: &'a CTOPInstance) -> Self {
        ScheduleOracle {
            instance,
            infeasible: HashMap::new(),
            feasible: HashMap::new(),
            stats: OracleStats::default(),
        }
    }

    pub fn stats(&self) -> &OracleStats {
        &self.stats
    }

    /// Schedule `order` with a per-vehicle `budget`; `None` if some node cannot be placed.
    pub fn schedule(&self, order: &[usize], budget: f64) -> Option<Schedule> {
        let instance = self.instance;
        let mut states = vec![VehicleState { position: instance.depot, time: 0.0 }; instance.vehicles.len()];
        let mut completion = Vec::with_capacity(order.len());

        for &c in order {
            let cluster = instance.cluster(c);
            let mut ready = 0.0;
            let mut pos = 0;

            while pos < cluster.len() {
                // (vehicle, covered, finish, last node)
                let mut best: Option<(usize, usize, f64, usize)> = None;

                for (v, state) in states.iter().enumerate() {
                    if !cluster.covers(v, pos) {
                        continue;
                    }
                    let mut at = state.position;
                    let mut t = state.time;
                    let mut p = pos;
                    while p < cluster.len() && cluster.covers(v, p) {
                        let node = cluster.nodes[p];
                        let arrive = t + instance.distance(at, node);
                        let start = if p == pos { arrive.max(ready) } else { arrive };
                        let end = start + instance.nodes[node].duration;
                        if end + instance.distance(node, instance.return_node) > budget + EPS {
                            break;
                        }
                        t = end;
                        at = node;
                        p += 1;
                    }
                    let covered = p - pos;
                    if covered == 0 {
                        continue;
                    }
                    let better = match best {
                        None => true,
                        Some((_, c_best, f_best, _)) => {
                            covered > c_best || (covered == c_best && t < f_best - EPS)
                        }
                    };
                    if better {
                        best = Some((v, covered, t, at));
                    }
                }

                let (v, covered, finish, last) = best?;
                states[v] = VehicleState { position: last, time: finish };
                ready = finish;
                pos += covered;
            }

            completion.push((c, ready));
        }

        Some(Schedule {
            completion,
            vehicle_times: states.iter().map(|s| s.time).collect(),
        })
    }

    /// Candidate orderings over the sorted ids `key`: by id, by centroid angle, by
    /// descending cost, then seeded shuffles. Depends on the set only, never on
    /// the order the caller listed it in.
    fn orderings(&self, key: &[usize], budget: usize) -> Vec<Vec<usize>> {
        let instance = self.instance;
        let depot = &instance.nodes[instance.depot];
        let mut orders = Vec::with_capacity(budget);
        orders.push(key.to_vec());

        if orders.len() < budget {
            let mut by_angle = key.to_vec();
            by_angle.sort_by_key(|&c| {
                let (x, y) = instance.cluster(c).centroid;
                OrderedFloat((y - depot.y).atan2(x - depot.x))
            });
            orders.push(by_angle);
        }
        if orders.len() < budget {
            let mut by_cost = key.to_vec();
            by_cost.sort_by_key(|&c| Reverse(OrderedFloat(instance.cluster(c).cost)));
            orders.push(by_cost);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(set_seed(key));
        while orders.len() < budget {
            let mut shuffled = key.to_vec();
            shuffled.shuffle(&mut rng);
            orders.push(shuffled);
        }

        orders
    }

    /// Pure feasibility test, no memo access
    fn routable(&self, candidate: &[usize], budget: usize) -> bool {
        if candidate.iter().any(|&c| !self.instance.cluster(c).is_servable()) {
            return false;
        }
        let key = sorted_key(candidate);
        self.orderings(&key, budget)
            .iter()
            .any(|order| self.schedule(order, self.instance.time_budget).is_some())
    }

    fn best_insertion(&self, current: &[usize], pool: &[usize]) -> Option<usize> {
        pool.par_iter()
            .filter_map(|&c| {
                let mut trial = current.to_vec();
                trial.push(c);
                self.routable(&trial, LOCAL_SEARCH_BUDGET)
                    .then(|| (c, self.instance.cluster(c).profit))
            })
            .max_by_key(|&(c, p)| (OrderedFloat(p), Reverse(c)))
            .map(|(c, _)| c)
    }

    fn best_swap(&self, current: &[usize], pool: &[usize]) -> Option<(usize, usize)> {
        let instance = self.instance;
        let pairs: Vec<(usize, usize, f64)> = current
            .iter()
            .flat_map(|&out| pool.iter().map(move |&inn| (out, inn)))
            .map(|(out, inn)| (out, inn, instance.cluster(inn).profit - instance.cluster(out).profit))
            .filter(|&(_, _, gain)| gain > EPS)
            .collect();

        pairs
            .par_iter()
            .filter_map(|&(out, inn, gain)| {
                let mut trial: Vec<usize> = current.iter().copied().filter(|&c| c != out).collect();
                trial.push(inn);
                self.routable(&trial, LOCAL_SEARCH_BUDGET)
                    .then_some((out, inn, gain))
            })
            .max_by_key(|&(out, inn, gain)| (OrderedFloat(gain), Reverse(out), Reverse(inn)))
            .map(|(out, inn, _)| (out, inn))
    }
}

fn sorted_key(candidate: &[usize]) -> Vec<usize> {
    let mut key = candidate.to_vec();
    key.sort_unstable();
    key.dedup();
    key
}

/// FNV-1a over the sorted ids
fn set_seed(key: &[usize]) -> u64 {
    key.iter().fold(0xcbf2_9ce4_8422_2325u64, |h, &c| {
        (h ^ c as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

impl<'a> FeasibilityOracle for ScheduleOracle<'a> {
    fn test_feasibility(
        &mut self,
        candidate: &[usize],
        node_budget: usize,
    ) -> Result<FeasibilityResult, OracleError> {
        self.stats.feasibility_calls += 1;
        if candidate.is_empty() {
            return Ok(FeasibilityResult::feasible(0.0));
        }
        let key = sorted_key(candidate);
        if let Some(&c) = key.iter().find(|&&c| c >= self.instance.num_clusters()) {
            return Err(OracleError::Solver(format!("unknown cluster {}", c)));
        }

        if let Some(&objective) = self.feasible.get(&key) {
            self.stats.memo_hits += 1;
            return Ok(FeasibilityResult::feasible(objective));
        }
        let budget = node_budget.max(1);
        if self.infeasible.get(&key).is_some_and(|&tried| tried >= budget) {
            self.stats.memo_hits += 1;
            return Ok(FeasibilityResult::infeasible());
        }

        self.stats.schedules_built += 1;
        if self.routable(candidate, budget) {
            let objective = self.instance.profit_of(&key);
            self.infeasible.remove(&key);
            self.feasible.insert(key, objective);
            Ok(FeasibilityResult::feasible(objective))
        } else {
            self.infeasible.insert(key, budget);
            Ok(FeasibilityResult::infeasible())
        }
    }

    fn local_search(
        &mut self,
        seed: &[usize],
        excluded: &HashSet<usize>,
        time_budget: Duration,
    ) -> Result<LocalSearchResult, OracleError> {
        self.stats.local_searches += 1;
        // None when the budget overflows the clock: run until no move is left
        let deadline = Instant::now().checked_add(time_budget);
        let expired = || deadline.is_some_and(|d| Instant::now() >= d);

        let mut current: Vec<usize> = if self.test_feasibility(seed, LOCAL_SEARCH_BUDGET)?.feasible {
            seed.to_vec()
        } else {
            log::warn!("local search seed {:?} is infeasible, starting from scratch", seed);
            Vec::new()
        };

        while !expired() {
            let pool: Vec<usize> = (0..self.instance.num_clusters())
                .filter(|c| !current.contains(c) && !excluded.contains(c))
                .filter(|&c| self.instance.cluster(c).is_servable())
                .collect();
            if pool.is_empty() {
                break;
            }

            if let Some(c) = self.best_insertion(&current, &pool) {
                current.push(c);
                continue;
            }
            if expired() {
                break;
            }
            match self.best_swap(&current, &pool) {
                Some((out, inn)) => {
                    current.retain(|&c| c != out);
                    current.push(inn);
                }
                None => break,
            }
        }

        let objective = self.instance.profit_of(&current);
        self.feasible.insert(sorted_key(&current), objective);
        Ok(LocalSearchResult { clusters: current, objective })
    }

    fn relaxed_bound(&mut self) -> f64 {
        self.instance
            .clusters
            .iter()
            .filter(|c| c.is_servable())
            .map(|c| c.profit)
            .sum()
    }

    fn relaxed_arrival_times(&mut self, candidate: &[usize]) -> Result<Vec<(usize, f64)>, OracleError> {
        let (servable, unservable): (Vec<usize>, Vec<usize>) = candidate
            .iter()
            .partition(|&&c| self.instance.cluster(c).is_servable());
        let schedule = self
            .schedule(&servable, f64::INFINITY)
            .ok_or(OracleError::RelaxationInfeasible)?;

        let mut arrivals = schedule.completion;
        arrivals.extend(unservable.into_iter().map(|c| (c, f64::INFINITY)));
        Ok(arrivals)
    }

    fn name(&self) -> &str {
        "ScheduleOracle"
    }
}
