//! Adaptive Large Neighborhood Search.
//!
//! [`engine::AlnsSearch`] drives the search. The remaining modules hold its
//! building blocks: the method sampler, the cluster roulette, the annealing
//! rule, the configuration and the telemetry records.

pub mod acceptance;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod record;
pub mod roulette;

pub use acceptance::{acceptance_barrier, Outcome, ScoreVector, SimulatedAnnealing};
pub use config::AlnsConfig;
pub use distribution::{WeightedDistribution, WeightedItem};
pub use engine::AlnsSearch;
pub use record::{
    IterationRecord, JsonLinesObserver, LogObserver, ProgressBarObserver, SearchObserver, SearchOutcome,
    SearchStatus, SegmentRecord, TerminationReason,
};
pub use roulette::ClusterRoulette;
