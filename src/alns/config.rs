//! ALNS configuration.

use super::acceptance::ScoreVector;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters of the ALNS search.
///
/// # Weights
///
/// After every iteration the destroy (and, when it ran, the repair) method gets
/// `λ·w + (1 − λ)·score`, where the score comes from `scores` according to the
/// outcome. At the end of a segment all weights go back to 1, then the most
/// probable methods are multiplied by `reward_factor` and the least probable by
/// `punish_factor`.
///
/// # Roulette
///
/// Inserted clusters cool down by `gamma`, the others warm up by `gamma`.
/// Clusters that cannot be repaired into a feasible solution are downscaled by
/// `failure_gamma`. A cluster that spent at least `nerf_barrier` of a segment's
/// observations below the average probability is switched off for the next
/// segment and excluded from local search.
///
/// # Temperature
///
/// Each segment restarts at `temperature_factor × relaxed bound` and cools by
/// `alpha` every iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlnsConfig {
    pub seed: u64,
    /// Wall-clock budget of the whole search
    pub time_limit: Duration,
    pub segment_size: usize,
    /// Inclusive cap: the search stops once this many segments have run
    pub max_segments: usize,
    /// Inclusive cap on consecutive segments that leave the global best unchanged
    pub max_segments_without_improvement: usize,
    /// Ends a segment early once this many iterations in a row missed the segment best
    pub max_iterations_without_improvement: usize,
    pub q_start: usize,
    pub q_step: usize,
    /// End the segment when `q` wraps around the cluster count. Off by default:
    /// `q` then keeps cycling and segments run to `segment_size`.
    pub stop_on_q_wrap: bool,
    pub lambda: f64,
    pub scores: ScoreVector,
    pub alpha: f64,
    pub temperature_factor: f64,
    pub gamma: f64,
    pub failure_gamma: f64,
    pub nerf_barrier: f64,
    pub reward_factor: f64,
    pub punish_factor: f64,
    /// Orderings the oracle may explore per feasibility check
    pub feasibility_node_budget: usize,
    pub local_search_time: Duration,
    /// Add the latest-arrival repair to the repair pool
    pub arrival_time_repair: bool,
}

impl Default for AlnsConfig {
    fn default() -> Self {
        AlnsConfig {
            seed: 42,
            time_limit: Duration::from_secs(60),
            segment_size: 100,
            max_segments: 50,
            max_segments_without_improvement: 10,
            max_iterations_without_improvement: 50,
            q_start: 1,
            q_step: 1,
            stop_on_q_wrap: false,
            lambda: 0.8,
            scores: ScoreVector::default(),
            alpha: 0.95,
            temperature_factor: 2.0,
            gamma: 0.1,
            failure_gamma: 0.1,
            nerf_barrier: 0.5,
            reward_factor: 1.5,
            punish_factor: 0.5,
            feasibility_node_budget: 32,
            local_search_time: Duration::from_secs(5),
            arrival_time_repair: false,
        }
    }
}

fn unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::new(name, value, "[0, 1]"))
    }
}

fn at_least_one(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value >= 1 {
        Ok(())
    } else {
        Err(ConfigError::new(name, value as f64, ">= 1"))
    }
}

impl AlnsConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_segments(mut self, segment_size: usize, max_segments: usize) -> Self {
        self.segment_size = segment_size;
        self.max_segments = max_segments;
        self
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_local_search_time(mut self, time: Duration) -> Self {
        self.local_search_time = time;
        self
    }

    pub fn with_arrival_time_repair(mut self, enabled: bool) -> Self {
        self.arrival_time_repair = enabled;
        self
    }

    /// Reject any parameter outside its admissible range
    pub fn validate(&self) -> Result<(), ConfigError> {
        unit("gamma", self.gamma)?;
        unit("failure_gamma", self.failure_gamma)?;
        unit("lambda", self.lambda)?;
        unit("nerf_barrier", self.nerf_barrier)?;

        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ConfigError::new("alpha", self.alpha, "(0, 1)"));
        }
        if !self.scores.is_valid() {
            let worst = self.scores.0.iter().copied().fold(f64::INFINITY, f64::min);
            return Err(ConfigError::new("scores", worst, "non-negative and non-increasing"));
        }

        at_least_one("segment_size", self.segment_size)?;
        at_least_one("q_step", self.q_step)?;
        at_least_one("q_start", self.q_start)?;
        at_least_one("feasibility_node_budget", self.feasibility_node_budget)?;

        if !(self.reward_factor >= 1.0 && self.reward_factor.is_finite()) {
            return Err(ConfigError::new("reward_factor", self.reward_factor, ">= 1"));
        }
        if !(self.punish_factor > 0.0 && self.punish_factor <= 1.0) {
            return Err(ConfigError::new("punish_factor", self.punish_factor, "(0, 1]"));
        }
        if !(self.temperature_factor > 0.0 && self.temperature_factor.is_finite()) {
            return Err(ConfigError::new("temperature_factor", self.temperature_factor, "> 0"));
        }
        if self.time_limit.is_zero() {
            return Err(ConfigError::new("time_limit", 0.0, "> 0 s"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(AlnsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_parameters_are_rejected() {
        let cases: Vec<(&str, AlnsConfig)> = vec![
            ("gamma", AlnsConfig { gamma: 1.5, ..Default::default() }),
            ("failure_gamma", AlnsConfig { failure_gamma: -0.1, ..Default::default() }),
            ("lambda", AlnsConfig { lambda: f64::NAN, ..Default::default() }),
            ("alpha", AlnsConfig { alpha: 1.0, ..Default::default() }),
            ("alpha", AlnsConfig { alpha: 0.0, ..Default::default() }),
            ("scores", AlnsConfig { scores: ScoreVector([0.0, 1.0, 2.0, 3.0]), ..Default::default() }),
            ("segment_size", AlnsConfig { segment_size: 0, ..Default::default() }),
            ("q_step", AlnsConfig { q_step: 0, ..Default::default() }),
            ("reward_factor", AlnsConfig { reward_factor: 0.9, ..Default::default() }),
            ("punish_factor", AlnsConfig { punish_factor: 0.0, ..Default::default() }),
            ("temperature_factor", AlnsConfig { temperature_factor: -2.0, ..Default::default() }),
            ("time_limit", AlnsConfig::default().with_time_limit(Duration::ZERO)),
        ];

        for (name, config) in cases {
            let err = config.validate().unwrap_err();
            assert_eq!(err.name, name);
        }
    }

    #[test]
    fn test_boundaries_are_accepted() {
        let config = AlnsConfig {
            gamma: 0.0,
            failure_gamma: 1.0,
            lambda: 1.0,
            nerf_barrier: 0.0,
            reward_factor: 1.0,
            punish_factor: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
