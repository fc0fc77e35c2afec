//! CTOP Solver Library
//!
//! Adaptive Large Neighborhood Search for the Clustered Team Orienteering
//! Problem with skill-constrained vehicles.
//!
//! # Features
//!
//! - Cluster/vehicle/node model with streak decomposition
//! - Greedy and random insertion/removal heuristics, similarity-based removals
//! - Adaptive method weights and a per-cluster admission roulette
//! - Simulated-annealing acceptance with segment-wise reheating
//! - Pluggable feasibility oracle, with a built-in list-scheduling oracle
//! - Iteration/segment telemetry for logs, JSON lines and progress bars
//!
//! # Example
//!
//! ```no_run
//! use ctop_solver::alns::{AlnsConfig, AlnsSearch, ProgressBarObserver};
//! use ctop_solver::instance::CTOPInstance;
//! use ctop_solver::oracle::ScheduleOracle;
//!
//! let instance = CTOPInstance::from_json_file("instance.json").unwrap();
//! let oracle = ScheduleOracle::new(&instance);
//!
//! let mut search = AlnsSearch::new(&instance, oracle, AlnsConfig::default()).unwrap();
//! search.add_observer(Box::new(ProgressBarObserver::new()));
//! let outcome = search.run().unwrap();
//!
//! println!("Best: {} with objective {:.2}", outcome.best, outcome.objective);
//! ```

pub mod alns;
pub mod error;
pub mod heuristics;
pub mod instance;
pub mod oracle;
pub mod solution;

pub use alns::{AlnsConfig, AlnsSearch, SearchOutcome};
pub use error::{ConfigError, InstanceError, OracleError, SearchError};
pub use instance::CTOPInstance;
pub use oracle::{FeasibilityOracle, ScheduleOracle};
pub use solution::Solution;
