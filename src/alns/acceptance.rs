//! Simulated-annealing acceptance and heuristic scoring.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// `exp((new − old) / T)`; at least 1 whenever `new ≥ old`
pub fn acceptance_barrier(old_objective: f64, new_objective: f64, temperature: f64) -> f64 {
    if new_objective >= old_objective {
        return 1.0_f64.max(((new_objective - old_objective) / temperature).exp());
    }
    if temperature <= 0.0 {
        return 0.0;
    }
    ((new_objective - old_objective) / temperature).exp()
}

/// Maximisation SA with geometric cooling, reset at every segment start
#[derive(Debug, Clone, Serialize)]
pub struct SimulatedAnnealing {
    pub temperature: f64,
    /// Cooling factor, in (0, 1)
    pub alpha: f64,
}

impl SimulatedAnnealing {
    pub fn new(temperature: f64, alpha: f64) -> Self {
        SimulatedAnnealing { temperature, alpha }
    }

    pub fn reset(&mut self, temperature: f64) {
        self.temperature = temperature;
    }

    pub fn cool(&mut self) {
        self.temperature *= self.alpha;
    }

    /// Draw the acceptance test; returns (accepted, barrier)
    pub fn accept<R: Rng>(&self, old_objective: f64, new_objective: f64, rng: &mut R) -> (bool, f64) {
        let barrier = acceptance_barrier(old_objective, new_objective, self.temperature);
        (rng.gen::<f64>() < barrier, barrier)
    }
}

/// Iteration outcome, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    NewGlobalBest,
    BetterThanPrevious,
    WorseAccepted,
    WorseRejected,
}

impl Outcome {
    /// Classify a feasible candidate. Equal objectives are not "better".
    pub fn classify(new_objective: f64, previous_objective: f64, global_best: f64, accepted: bool) -> Outcome {
        if new_objective > global_best {
            Outcome::NewGlobalBest
        } else if new_objective > previous_objective {
            Outcome::BetterThanPrevious
        } else if accepted {
            Outcome::WorseAccepted
        } else {
            Outcome::WorseRejected
        }
    }

    fn index(&self) -> usize {
        match self {
            Outcome::NewGlobalBest => 0,
            Outcome::BetterThanPrevious => 1,
            Outcome::WorseAccepted => 2,
            Outcome::WorseRejected => 3,
        }
    }
}

/// Scores `[s0 ≥ s1 ≥ s2 ≥ s3]` awarded per outcome
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreVector(pub [f64; 4]);

impl Default for ScoreVector {
    fn default() -> Self {
        ScoreVector([3.0, 2.0, 1.0, 0.0])
    }
}

impl ScoreVector {
    pub fn score(&self, outcome: Outcome) -> f64 {
        self.0[outcome.index()]
    }

    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|&s| s >= 0.0 && s.is_finite()) && self.0.windows(2).all(|w| w[0] >= w[1])
    }
}

/// `λ·old + (1 − λ)·score`
#[inline]
pub fn update_weight(old_weight: f64, score: f64, lambda: f64) -> f64 {
    lambda * old_weight + (1.0 - lambda) * score
}
