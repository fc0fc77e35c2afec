//! Error types for instance construction, configuration, the oracle and the search.

use thiserror::Error;

/// Errors raised while building a [`crate::instance::CTOPInstance`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstanceError {
    #[error("node {node} referenced by cluster {cluster} does not exist")]
    UnknownNode { cluster: usize, node: usize },
    #[error("cluster {0} has no nodes")]
    EmptyCluster(usize),
    #[error("cluster {cluster} has negative profit {profit}")]
    NegativeProfit { cluster: usize, profit: f64 },
    #[error("node {node} has negative service duration {duration}")]
    NegativeDuration { node: usize, duration: f64 },
    #[error("node ids must be dense: node at position {position} has id {id}")]
    NonDenseNodeIds { position: usize, id: usize },
    #[error("vehicle ids must be dense: vehicle at position {position} has id {id}")]
    NonDenseVehicleIds { position: usize, id: usize },
    #[error("{role} node {node} does not exist")]
    InvalidTerminal { role: &'static str, node: usize },
    #[error("time budget must be positive and finite, got {0}")]
    InvalidTimeBudget(f64),
    #[error("instance has no vehicles")]
    NoVehicles,
    #[error("cannot read instance: {0}")]
    Io(String),
    #[error("cannot decode instance: {0}")]
    Decode(String),
}

/// A search parameter outside its admissible range.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("parameter `{name}` = {value} is out of range, expected {expected}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: f64,
    pub expected: &'static str,
}

impl ConfigError {
    pub fn new(name: &'static str, value: f64, expected: &'static str) -> Self {
        ConfigError { name, value, expected }
    }
}

/// Failures reported by a [`crate::oracle::FeasibilityOracle`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    /// The budget-free relaxation of a candidate set has no solution.
    #[error("relaxed model is infeasible for the candidate set")]
    RelaxationInfeasible,
    #[error("solver failure: {0}")]
    Solver(String),
}

/// Unrecoverable search failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    /// The relaxed model became infeasible although the solution was feasible before destruction.
    #[error("relaxation of {clusters:?} reported infeasible, the relaxed model is inconsistent")]
    InconsistentRelaxation { clusters: Vec<usize> },
    #[error("instance has no clusters")]
    EmptyInstance,
}
