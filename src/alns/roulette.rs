//! Per-cluster admission probabilities.
//!
//! Every cluster carries a probability p in [0, 1] of being admitted into the
//! insertion candidate pool. Freshly inserted clusters cool down, the others warm
//! up, and clusters that stay below the average for most of a segment are flagged
//! as nerf candidates and shut off at the segment boundary.

use crate::solution::Solution;
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ClusterRoulette {
    probabilities: Vec<f64>,
    nerf_counts: Vec<usize>,
    observations: usize,
}

#[inline]
fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

impl ClusterRoulette {
    /// One entry per cluster id in `0..num_clusters`, all probabilities at 1
    pub fn new(num_clusters: usize) -> Self {
        ClusterRoulette {
            probabilities: vec![1.0; num_clusters],
            nerf_counts: vec![0; num_clusters],
            observations: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    pub fn probability(&self, cluster: usize) -> Option<f64> {
        self.probabilities.get(cluster).copied()
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn observations(&self) -> usize {
        self.observations
    }

    pub fn nerf_count(&self, cluster: usize) -> Option<usize> {
        self.nerf_counts.get(cluster).copied()
    }

    /// Fraction of observations in which the cluster sat below the average
    pub fn nerf_ratio(&self, cluster: usize) -> f64 {
        if self.observations == 0 {
            return 0.0;
        }
        self.nerf_counts.get(cluster).copied().unwrap_or(0) as f64 / self.observations as f64
    }

    /// One Bernoulli trial per cluster, in id order
    pub fn query<R: Rng>(&self, rng: &mut R) -> Vec<usize> {
        self.probabilities
            .iter()
            .enumerate()
            .filter(|&(_, &p)| rng.gen::<f64>() < p)
            .map(|(c, _)| c)
            .collect()
    }

    pub fn query_below_nerf_barrier(&self, barrier: f64) -> Vec<usize> {
        (0..self.len()).filter(|&c| self.nerf_ratio(c) < barrier).collect()
    }

    /// Clusters strictly above the average probability
    pub fn query_above_average_probability(&self) -> Vec<usize> {
        let average = self.average_probability();
        (0..self.len()).filter(|&c| self.probabilities[c] > average).collect()
    }

    /// Insertion candidates for `solution`.
    ///
    /// Tries the Bernoulli query first, then the clusters below the nerf barrier,
    /// then the above-average ones, then every cluster. Each stage excludes the
    /// clusters already in the solution; the first non-empty stage wins.
    pub fn candidates<R: Rng>(&self, solution: &Solution, nerf_barrier: f64, rng: &mut R) -> Vec<usize> {
        let outside = |pool: Vec<usize>| -> Vec<usize> {
            pool.into_iter().filter(|&c| !solution.contains(c)).collect()
        };

        let admitted = outside(self.query(rng));
        if !admitted.is_empty() {
            return admitted;
        }
        let below = outside(self.query_below_nerf_barrier(nerf_barrier));
        if !below.is_empty() {
            return below;
        }
        let above = outside(self.query_above_average_probability());
        if !above.is_empty() {
            return above;
        }
        outside((0..self.len()).collect())
    }

    /// p ← γp + (1 − γ), moving p towards 1
    pub fn upscale(&mut self, gamma: f64, clusters: &[usize]) {
        let gamma = clamp_unit(gamma);
        for &c in clusters {
            if let Some(p) = self.probabilities.get_mut(c) {
                *p = clamp_unit(gamma * *p + (1.0 - gamma));
            }
        }
    }

    /// p ← γp, moving p towards 0
    pub fn downscale(&mut self, gamma: f64, clusters: &[usize]) {
        let gamma = clamp_unit(gamma);
        for &c in clusters {
            if let Some(p) = self.probabilities.get_mut(c) {
                *p = clamp_unit(gamma * *p);
            }
        }
    }

    pub fn cooldown(&mut self, gamma: f64, hot: &[usize]) {
        self.downscale(1.0 - clamp_unit(gamma), hot);
    }

    /// Upscale every cluster that is not in `hot`
    pub fn warmup(&mut self, gamma: f64, hot: &[usize]) {
        let cold: Vec<usize> = (0..self.len()).filter(|c| !hot.contains(c)).collect();
        self.upscale(1.0 - clamp_unit(gamma), &cold);
    }

    pub fn average_probability(&self) -> f64 {
        if self.probabilities.is_empty() {
            return 0.5;
        }
        self.probabilities.iter().sum::<f64>() / self.probabilities.len() as f64
    }

    pub fn record_observation(&mut self) {
        let average = self.average_probability();
        for (count, &p) in self.nerf_counts.iter_mut().zip(&self.probabilities) {
            if p < average {
                *count += 1;
            }
        }
        self.observations += 1;
    }

    pub fn reset_observations(&mut self) {
        self.nerf_counts.iter_mut().for_each(|n| *n = 0);
        self.observations = 0;
    }

    /// Clusters whose nerf ratio reached `barrier`; none before the first observation
    pub fn nerf_candidates(&self, barrier: f64) -> Vec<usize> {
        if self.observations == 0 {
            return Vec::new();
        }
        (0..self.len()).filter(|&c| self.nerf_ratio(c) >= barrier).collect()
    }

    /// Shut off the nerf candidates and fully re-open everything else
    pub fn punish_and_reset(&mut self, barrier: f64) -> Vec<usize> {
        let nerfed = self.nerf_candidates(barrier);
        for (c, p) in self.probabilities.iter_mut().enumerate() {
            *p = if nerfed.contains(&c) { 0.0 } else { 1.0 };
        }
        nerfed
    }

    pub fn snapshot(&self) -> Vec<f64> {
        self.probabilities.clone()
    }
}
