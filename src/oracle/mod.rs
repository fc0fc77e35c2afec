//! Feasibility oracles.
//!
//! The search never routes vehicles itself. It asks an oracle whether a set of
//! clusters admits a feasible routing, what that routing is worth, and for a
//! bounded local search around a seed set. Any exact or heuristic solver can
//! sit behind [`FeasibilityOracle`]; [`ScheduleOracle`] is the built-in one.

mod schedule;

pub use schedule::{OracleStats, Schedule, ScheduleOracle};

use crate::error::OracleError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Answer to a feasibility query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityResult {
    pub feasible: bool,
    /// Objective of the routing, present iff feasible
    pub objective: Option<f64>,
}

impl FeasibilityResult {
    pub fn feasible(objective: f64) -> Self {
        FeasibilityResult { feasible: true, objective: Some(objective) }
    }

    pub fn infeasible() -> Self {
        FeasibilityResult { feasible: false, objective: None }
    }
}

/// Result of an oracle-side local search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSearchResult {
    pub clusters: Vec<usize>,
    pub objective: f64,
}

/// The narrow interface the search relies on.
///
/// Calls take `&mut self`: the oracle may hold solver state that is read right
/// after a call returns, so at most one call is in flight at a time.
pub trait FeasibilityOracle {
    /// Whether `candidate` can be routed, exploring at most `node_budget` search nodes.
    ///
    /// Must be deterministic for a fixed candidate set. Infeasible sets should be
    /// remembered so that repeated identical queries are cheap.
    fn test_feasibility(
        &mut self,
        candidate: &[usize],
        node_budget: usize,
    ) -> Result<FeasibilityResult, OracleError>;

    /// Improve on `seed` for at most `time_budget`, never selecting an `excluded` cluster.
    fn local_search(
        &mut self,
        seed: &[usize],
        excluded: &HashSet<usize>,
        time_budget: Duration,
    ) -> Result<LocalSearchResult, OracleError>;

    /// Upper bound on the best achievable objective
    fn relaxed_bound(&mut self) -> f64;

    /// Completion time of each cluster of `candidate` in the budget-free relaxation.
    fn relaxed_arrival_times(&mut self, _candidate: &[usize]) -> Result<Vec<(usize, f64)>, OracleError> {
        Err(OracleError::Solver(format!("{} does not provide arrival times", self.name())))
    }

    fn name(&self) -> &str;
}
