use crate::error::OracleError;
use crate::instance::CTOPInstance;
use crate::oracle::FeasibilityOracle;
use crate::solution::Solution;
use log::debug;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

/// A feasible starting point for the search
#[derive(Debug, Clone)]
pub struct Constructed {
    pub solution: Solution,
    pub objective: f64,
}

pub trait ConstructionHeuristic {
    fn construct(
        &self,
        instance: &CTOPInstance,
        oracle: &mut dyn FeasibilityOracle,
    ) -> Result<Constructed, OracleError>;
    fn name(&self) -> &str;
}

/// Prefix-greedy construction
///
/// Clusters are sorted by ascending number of vehicles required (unservable
/// last), ascending node count, then descending profit/cost ratio, and added one
/// by one while the oracle accepts the set. The first rejected addition stops the
/// construction; the last accepted prefix is returned.
pub struct PrefixGreedyConstruction {
    pub node_budget: usize,
}

impl PrefixGreedyConstruction {
    pub fn new(node_budget: usize) -> Self {
        PrefixGreedyConstruction { node_budget: node_budget.max(1) }
    }

    /// Cluster ids in insertion order
    pub fn order(&self, instance: &CTOPInstance) -> Vec<usize> {
        let mut order: Vec<usize> = (0..instance.num_clusters()).collect();
        order.sort_by_key(|&c| {
            let cluster = instance.cluster(c);
            let vehicles = match cluster.max_vehicles_required {
                Some(k) => (false, k),
                None => (true, usize::MAX),
            };
            (vehicles, cluster.len(), Reverse(OrderedFloat(cluster.ratio())))
        });
        order
    }
}

impl Default for PrefixGreedyConstruction {
    fn default() -> Self {
        Self::new(32)
    }
}

impl ConstructionHeuristic for PrefixGreedyConstruction {
    fn construct(
        &self,
        instance: &CTOPInstance,
        oracle: &mut dyn FeasibilityOracle,
    ) -> Result<Constructed, OracleError> {
        let mut solution = Solution::new();
        let mut objective = 0.0;

        for c in self.order(instance) {
            let trial = solution.with(&[c]);
            let result = oracle.test_feasibility(trial.clusters(), self.node_budget)?;
            match result.objective {
                Some(value) if result.feasible => {
                    solution = trial;
                    objective = value;
                }
                _ => {
                    debug!("construction stops at cluster {} ({} selected)", c, solution.len());
                    break;
                }
            }
        }

        Ok(Constructed { solution, objective })
    }

    fn name(&self) -> &str {
        "PrefixGreedy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::{create_test_instance, create_test_instance_with_budget};
    use crate::oracle::ScheduleOracle;

    #[test]
    fn test_order() {
        let instance = create_test_instance();
        let heuristic = PrefixGreedyConstruction::default();
        // single-vehicle clusters first, then the two-vehicle cluster 0, unservable 3 last
        assert_eq!(heuristic.order(&instance), vec![2, 1, 0, 3]);
    }

    #[test]
    fn test_construct_stops_at_first_infeasible_addition() {
        let instance = create_test_instance_with_budget(14.0);
        let mut oracle = ScheduleOracle::new(&instance);
        let heuristic = PrefixGreedyConstruction::default();

        // cluster 2 alone cannot be reached within the budget
        let constructed = heuristic.construct(&instance, &mut oracle).unwrap();
        assert!(constructed.solution.is_empty());
        assert_eq!(constructed.objective, 0.0);
    }

    #[test]
    fn test_construct_with_generous_budget() {
        let instance = create_test_instance();
        let mut oracle = ScheduleOracle::new(&instance);
        let heuristic = PrefixGreedyConstruction::default();

        let constructed = heuristic.construct(&instance, &mut oracle).unwrap();
        assert_eq!(constructed.solution.clusters(), &[2, 1, 0]);
        assert_eq!(constructed.objective, 20.0);
    }
}
