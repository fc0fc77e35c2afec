//! ALNS orchestration.
//!
//! `INIT → CONSTRUCTIVE → SEGMENT(ITERATE → LOCAL_SEARCH) → TERMINATED`
//!
//! Each iteration draws a destroy (insertion) and a repair (removal) method,
//! inserts roulette candidates into the running solution, and asks the oracle
//! whether the result is feasible. Infeasible candidates are repaired with
//! growing removal degree. Feasible ones go through simulated-annealing
//! acceptance, and the outcome feeds back into method weights and cluster
//! probabilities. Segments end with a hard reset of both and an optional
//! oracle-side local search.

use super::acceptance::{update_weight, Outcome, SimulatedAnnealing};
use super::config::AlnsConfig;
use super::distribution::WeightedDistribution;
use super::record::{
    progress_estimate, IterationRecord, SearchObserver, SearchOutcome, SearchStatus, SegmentRecord,
    TerminationReason,
};
use super::roulette::ClusterRoulette;
use crate::error::{OracleError, SearchError};
use crate::heuristics::construction::{ConstructionHeuristic, PrefixGreedyConstruction};
use crate::heuristics::destroy::DestroyMethod;
use crate::heuristics::repair::{RepairContext, RepairMethod};
use crate::instance::CTOPInstance;
use crate::oracle::{FeasibilityOracle, FeasibilityResult};
use crate::solution::Solution;
use chrono::Utc;
use log::{debug, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Mutable search state shared by the iterations of a run
#[derive(Debug, Clone)]
struct SearchState {
    current: Solution,
    current_objective: f64,
    segment_best: Solution,
    segment_best_objective: f64,
    global_best: Solution,
    global_best_objective: f64,
    q: usize,
    segment: usize,
    iteration: usize,
    /// Iterations since the segment best last improved
    stale_iterations: usize,
}

impl SearchState {
    fn new(solution: Solution, objective: f64, q: usize) -> Self {
        SearchState {
            current: solution.clone(),
            current_objective: objective,
            segment_best: solution.clone(),
            segment_best_objective: objective,
            global_best: solution,
            global_best_objective: objective,
            q,
            segment: 0,
            iteration: 0,
            stale_iterations: 0,
        }
    }

    fn begin_segment(&mut self, segment: usize, q: usize) {
        self.segment = segment;
        self.iteration = 0;
        self.stale_iterations = 0;
        self.q = q;
        self.segment_best = self.current.clone();
        self.segment_best_objective = self.current_objective;
    }
}

/// Reset all weights to 1, then reward the previously most probable items and
/// punish the previously least probable ones. Nothing is scaled when every item
/// was tied.
fn rebalance<T: Clone + PartialEq>(dist: &mut WeightedDistribution<T>, reward: f64, punish: f64) {
    let winners = dist.most_probable_all();
    let losers = dist.least_probable_all();
    dist.reset_weights();
    if winners == losers {
        return;
    }
    dist.scale_weights(&winners, reward);
    dist.scale_weights(&losers, punish);
}

/// The ALNS search over one instance and one oracle
pub struct AlnsSearch<'a, O: FeasibilityOracle> {
    instance: &'a CTOPInstance,
    oracle: O,
    config: AlnsConfig,
    rng: ChaCha8Rng,
    roulette: ClusterRoulette,
    destroy: WeightedDistribution<DestroyMethod>,
    repair: WeightedDistribution<RepairMethod>,
    annealing: SimulatedAnnealing,
    observers: Vec<Box<dyn SearchObserver + 'a>>,
    cancel: Arc<AtomicBool>,
}

impl<'a, O: FeasibilityOracle> AlnsSearch<'a, O> {
    /// Validate `config` and set up a search; nothing runs yet
    pub fn new(instance: &'a CTOPInstance, oracle: O, config: AlnsConfig) -> Result<Self, SearchError> {
        config.validate()?;
        if instance.num_clusters() == 0 {
            return Err(SearchError::EmptyInstance);
        }

        let mut destroy = WeightedDistribution::new();
        for method in DestroyMethod::ALL {
            destroy.add(method, method.label());
        }
        let mut repair = WeightedDistribution::new();
        for method in RepairMethod::BASIC {
            repair.add(method, method.label());
        }
        if config.arrival_time_repair {
            repair.add(RepairMethod::LatestArrival, RepairMethod::LatestArrival.label());
        }

        Ok(AlnsSearch {
            instance,
            oracle,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            roulette: ClusterRoulette::new(instance.num_clusters()),
            destroy,
            repair,
            annealing: SimulatedAnnealing::new(1.0, config.alpha),
            observers: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    /// Share an externally owned cancellation flag
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    /// Setting the returned flag stops the search at the next iteration or segment boundary
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn add_observer(&mut self, observer: Box<dyn SearchObserver + 'a>) {
        self.observers.push(observer);
    }

    pub fn config(&self) -> &AlnsConfig {
        &self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn into_oracle(self) -> O {
        self.oracle
    }

    pub fn roulette(&self) -> &ClusterRoulette {
        &self.roulette
    }

    pub fn destroy_weights(&self) -> Vec<(String, f64)> {
        self.destroy.snapshot()
    }

    pub fn repair_weights(&self) -> Vec<(String, f64)> {
        self.repair.snapshot()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Run the search until a stopping criterion or cancellation
    pub fn run(&mut self) -> Result<SearchOutcome, SearchError> {
        let start = Instant::now();
        let started_at = Utc::now().to_rfc3339();
        let budget = self.config.feasibility_node_budget;
        info!("ALNS with {} oracle on\n{}", self.oracle.name(), self.instance.statistics());

        let construction = PrefixGreedyConstruction::new(budget);
        let initial = construction.construct(self.instance, &mut self.oracle)?;
        info!(
            "{} construction: {} with objective {:.2}",
            construction.name(),
            initial.solution,
            initial.objective
        );

        let relaxed = self.oracle.relaxed_bound();
        let q_start = 1 + (self.config.q_start - 1) % self.instance.num_clusters();
        let mut state = SearchState::new(initial.solution, initial.objective, q_start);

        let mut segments = 0;
        let mut iterations = 0;
        let mut stale_segments = 0;
        let mut local_search_improvements = 0;
        let mut history = Vec::new();

        let status = loop {
            if self.is_cancelled() {
                break SearchStatus::Interrupted;
            }
            if start.elapsed() >= self.config.time_limit {
                break SearchStatus::Completed(TerminationReason::TimeLimit);
            }
            if segments >= self.config.max_segments {
                break SearchStatus::Completed(TerminationReason::MaxSegments);
            }
            if stale_segments >= self.config.max_segments_without_improvement {
                break SearchStatus::Completed(TerminationReason::NoImprovement);
            }

            let segment_start_objective = state.global_best_objective;
            state.begin_segment(segments, q_start);
            self.roulette.reset_observations();
            self.annealing.reset(self.config.temperature_factor * relaxed);

            let mut interrupted = false;
            while state.iteration < self.config.segment_size {
                if self.is_cancelled() {
                    interrupted = true;
                    break;
                }
                if start.elapsed() >= self.config.time_limit {
                    break;
                }

                let destroy = self.destroy.draw(&mut self.rng).copied().unwrap_or(DestroyMethod::GreedyProfit);
                let repair = self.repair.draw(&mut self.rng).copied().unwrap_or(RepairMethod::HighCostRemoval);
                let record = self.iterate(&mut state, destroy, repair, start.elapsed())?;
                iterations += 1;
                state.iteration += 1;
                for observer in &mut self.observers {
                    observer.on_iteration(&record);
                }

                let (q, wrapped) = self.advance_q(state.q);
                state.q = q;
                if wrapped && self.config.stop_on_q_wrap {
                    debug!("q wrapped, ending segment {}", state.segment);
                    break;
                }
                if state.stale_iterations >= self.config.max_iterations_without_improvement {
                    debug!("segment {} stalled after {} iterations", state.segment, state.iteration);
                    break;
                }
            }
            if interrupted {
                break SearchStatus::Interrupted;
            }

            rebalance(&mut self.destroy, self.config.reward_factor, self.config.punish_factor);
            rebalance(&mut self.repair, self.config.reward_factor, self.config.punish_factor);
            let nerfed = self.roulette.punish_and_reset(self.config.nerf_barrier);

            let improved = state.global_best_objective > segment_start_objective;
            let remaining = self.config.time_limit.saturating_sub(start.elapsed());
            let mut local_search_objective = None;
            if improved && !remaining.is_zero() && !self.is_cancelled() {
                let excluded: HashSet<usize> = nerfed.iter().copied().collect();
                let time = self.config.local_search_time.min(remaining);
                let result = self.oracle.local_search(state.global_best.clusters(), &excluded, time)?;
                local_search_objective = Some(result.objective);
                if result.objective >= state.global_best_objective {
                    if result.objective > state.global_best_objective {
                        local_search_improvements += 1;
                        info!("local search improved {:.2} -> {:.2}", state.global_best_objective, result.objective);
                    }
                    state.global_best = Solution::from_clusters(result.clusters);
                    state.global_best_objective = result.objective;
                    state.current = state.global_best.clone();
                    state.current_objective = result.objective;
                }
            }

            segments += 1;
            stale_segments = if improved { 0 } else { stale_segments + 1 };
            history.push(state.global_best_objective);
            info!(
                "segment {}: {} iterations, best {:.2}{}",
                state.segment,
                state.iteration,
                state.global_best_objective,
                if improved { " (improved)" } else { "" }
            );

            let record = SegmentRecord {
                segment: state.segment,
                iterations: state.iteration,
                elapsed_secs: start.elapsed().as_secs_f64(),
                final_temperature: self.annealing.temperature,
                global_best: state.global_best.clone(),
                global_best_objective: state.global_best_objective,
                improved,
                destroy_weights: self.destroy.snapshot(),
                repair_weights: self.repair.snapshot(),
                nerfed,
                local_search_objective,
                roulette: self.roulette.snapshot(),
            };
            let progress = progress_estimate(start.elapsed(), self.config.time_limit, segments, self.config.max_segments);
            for observer in &mut self.observers {
                observer.on_segment(&record);
                observer.on_progress(progress);
            }
        };

        let check = self.oracle.test_feasibility(state.global_best.clusters(), budget)?;
        let verified = match check.objective {
            Some(objective) if check.feasible => {
                let agreed = (objective - state.global_best_objective).abs() <= 1e-6 * state.global_best_objective.abs().max(1.0);
                if !agreed {
                    warn!(
                        "re-validation reports objective {:.4} instead of {:.4}",
                        objective, state.global_best_objective
                    );
                    state.global_best_objective = objective;
                }
                agreed
            }
            _ => {
                warn!("re-validation rejects the best solution {}", state.global_best);
                false
            }
        };

        let outcome = SearchOutcome {
            best: state.global_best,
            objective: state.global_best_objective,
            status,
            segments,
            iterations,
            elapsed: start.elapsed(),
            local_search_improvements,
            destroy_weights: self.destroy.snapshot(),
            repair_weights: self.repair.snapshot(),
            history,
            verified,
            started_at,
        };
        info!(
            "ALNS finished ({:?}): {} with objective {:.2} after {} segments, {} iterations, {:.2}s",
            outcome.status,
            outcome.best,
            outcome.objective,
            outcome.segments,
            outcome.iterations,
            outcome.elapsed.as_secs_f64()
        );
        for observer in &mut self.observers {
            observer.on_progress(100);
            observer.on_finish(&outcome);
        }
        Ok(outcome)
    }

    /// Next degree and whether it wrapped past the cluster count
    fn advance_q(&self, q: usize) -> (usize, bool) {
        let n = self.instance.num_clusters();
        let next = q + self.config.q_step;
        (1 + (next - 1) % n, next > n)
    }

    fn update_weights(&mut self, destroy: DestroyMethod, repair: Option<RepairMethod>, outcome: Outcome) {
        let score = self.config.scores.score(outcome);
        let lambda = self.config.lambda;
        if let Some(w) = self.destroy.weight_of(&destroy) {
            self.destroy.set_weight(&destroy, update_weight(w, score, lambda));
        }
        if let Some(repair) = repair {
            if let Some(w) = self.repair.weight_of(&repair) {
                self.repair.set_weight(&repair, update_weight(w, score, lambda));
            }
        }
    }

    fn iterate(
        &mut self,
        state: &mut SearchState,
        destroy: DestroyMethod,
        repair: RepairMethod,
        elapsed: Duration,
    ) -> Result<IterationRecord, SearchError> {
        let old_solution = state.current.clone();
        let old_objective = state.current_objective;
        let temperature = self.annealing.temperature;
        let q = state.q;

        let mut candidate = destroy.apply(
            self.instance,
            &self.roulette,
            self.config.nerf_barrier,
            &state.current,
            q,
            &mut self.rng,
        );
        let inserted = candidate.difference(&state.current);
        self.roulette.cooldown(self.config.gamma, &inserted);
        self.roulette.warmup(self.config.gamma, &inserted);

        let mut result = self.oracle.test_feasibility(candidate.clusters(), self.config.feasibility_node_budget)?;
        let repaired = !result.feasible;
        if repaired {
            let (out, res) = self.repair_to_feasibility(repair, &candidate)?;
            candidate = out;
            result = res;
        }

        let mut comment = String::new();
        let (outcome, accepted, barrier, new_objective) = match result.objective.filter(|_| result.feasible) {
            None => {
                warn!(
                    "[{}:{}] {} could not repair {} into a feasible solution",
                    state.segment, state.iteration, repair, candidate
                );
                comment.push_str("repair exhausted");
                self.roulette.downscale(self.config.failure_gamma, &inserted);
                self.roulette.record_observation();
                self.update_weights(destroy, Some(repair), Outcome::WorseRejected);
                self.annealing.cool();
                state.stale_iterations += 1;
                (Outcome::WorseRejected, false, None, None)
            }
            Some(new_objective) => {
                let (accepted, barrier) = self.annealing.accept(old_objective, new_objective, &mut self.rng);
                let outcome = Outcome::classify(new_objective, old_objective, state.global_best_objective, accepted);

                if new_objective > state.segment_best_objective {
                    state.segment_best = candidate.clone();
                    state.segment_best_objective = new_objective;
                    state.stale_iterations = 0;
                } else {
                    state.stale_iterations += 1;
                }
                if outcome == Outcome::NewGlobalBest {
                    state.global_best = candidate.clone();
                    state.global_best_objective = new_objective;
                    comment.push_str("new global best");
                }

                self.update_weights(destroy, repaired.then_some(repair), outcome);
                self.roulette.record_observation();
                self.annealing.cool();
                if accepted {
                    state.current = candidate.clone();
                    state.current_objective = new_objective;
                }
                (outcome, accepted, Some(barrier), Some(new_objective))
            }
        };

        debug!(
            "[{}:{}] {} / {} q={} {:?} {:?}",
            state.segment,
            state.iteration,
            destroy,
            if repaired { repair.label() } else { "-" },
            q,
            outcome,
            new_objective
        );

        Ok(IterationRecord {
            segment: state.segment,
            iteration: state.iteration,
            elapsed_secs: elapsed.as_secs_f64(),
            destroy: destroy.label().to_string(),
            destroy_weight: self.destroy.weight_of(&destroy).unwrap_or(0.0),
            repair: repaired.then(|| repair.label().to_string()),
            repair_weight: if repaired { self.repair.weight_of(&repair) } else { None },
            temperature,
            barrier,
            q,
            old_solution,
            old_objective,
            new_solution: candidate,
            new_objective,
            segment_best: state.segment_best.clone(),
            segment_best_objective: state.segment_best_objective,
            global_best: state.global_best.clone(),
            global_best_objective: state.global_best_objective,
            outcome,
            accepted,
            repaired,
            roulette: self.roulette.snapshot(),
            comment,
        })
    }

    /// Apply `method` with q = 1, 2, … to the original `infeasible` solution until the
    /// oracle accepts the result or q reaches |solution| − 1. Returns the last attempt.
    fn repair_to_feasibility(
        &mut self,
        method: RepairMethod,
        infeasible: &Solution,
    ) -> Result<(Solution, FeasibilityResult), SearchError> {
        let arrivals: Option<HashMap<usize, f64>> = if method == RepairMethod::LatestArrival {
            match self.oracle.relaxed_arrival_times(infeasible.clusters()) {
                Ok(times) => Some(times.into_iter().collect()),
                Err(OracleError::RelaxationInfeasible) => {
                    return Err(SearchError::InconsistentRelaxation { clusters: infeasible.clusters().to_vec() });
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };
        let ctx = match &arrivals {
            Some(times) => RepairContext::with_arrivals(self.instance, times),
            None => RepairContext::new(self.instance),
        };

        let mut last = (infeasible.clone(), FeasibilityResult::infeasible());
        for q in 1..infeasible.len() {
            let attempt = method.apply(&ctx, infeasible, q, &mut self.rng);
            let result = self.oracle.test_feasibility(attempt.clusters(), self.config.feasibility_node_budget)?;
            let feasible = result.feasible;
            last = (attempt, result);
            if feasible {
                break;
            }
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::{create_test_instance, create_test_instance_with_budget};
    use crate::instance::{ClusterData, Node, Vehicle};
    use crate::oracle::{LocalSearchResult, ScheduleOracle};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn small_config() -> AlnsConfig {
        AlnsConfig {
            segment_size: 20,
            max_segments: 5,
            time_limit: Duration::from_secs(30),
            local_search_time: Duration::from_secs(1),
            ..Default::default()
        }
    }

    /// A, B near the depot, C far away: C is the costliest cluster
    fn three_cluster_instance() -> CTOPInstance {
        let nodes = vec![
            Node::waypoint(0, 0.0, 0.0),
            Node::waypoint(1, 1.0, 0.0),
            Node::new(2, 1.0, 1.0, Some(1), 1.0),
            Node::new(3, 2.0, 1.0, Some(1), 1.0),
            Node::new(4, 50.0, 50.0, Some(1), 1.0),
        ];
        let clusters = vec![
            ClusterData { nodes: vec![2], profit: 4.0 },
            ClusterData { nodes: vec![3], profit: 6.0 },
            ClusterData { nodes: vec![4], profit: 5.0 },
        ];
        CTOPInstance::new("three", nodes, vec![Vehicle::new(0, [1])], clusters, 0, 1, 100.0).unwrap()
    }

    /// Feasible exactly for subsets of `allowed`; objective is the profit sum
    struct SubsetOracle<'a> {
        instance: &'a CTOPInstance,
        allowed: HashSet<usize>,
        relaxation_fails: bool,
        /// Number of leading queries answered infeasible regardless of the set
        reject_first: usize,
        /// Returned by local search in place of the seed
        local_search_result: Option<LocalSearchResult>,
        /// (seed, excluded) of every local search call
        local_searches: Vec<(Vec<usize>, HashSet<usize>)>,
    }

    impl<'a> SubsetOracle<'a> {
        fn new(instance: &'a CTOPInstance, allowed: &[usize]) -> Self {
            SubsetOracle {
                instance,
                allowed: allowed.iter().copied().collect(),
                relaxation_fails: false,
                reject_first: 0,
                local_search_result: None,
                local_searches: Vec::new(),
            }
        }
    }

    impl<'a> FeasibilityOracle for SubsetOracle<'a> {
        fn test_feasibility(&mut self, candidate: &[usize], _: usize) -> Result<FeasibilityResult, OracleError> {
            if self.reject_first > 0 {
                self.reject_first -= 1;
                return Ok(FeasibilityResult::infeasible());
            }
            if candidate.iter().all(|c| self.allowed.contains(c)) {
                Ok(FeasibilityResult::feasible(self.instance.profit_of(candidate)))
            } else {
                Ok(FeasibilityResult::infeasible())
            }
        }

        fn local_search(
            &mut self,
            seed: &[usize],
            excluded: &HashSet<usize>,
            _: Duration,
        ) -> Result<LocalSearchResult, OracleError> {
            self.local_searches.push((seed.to_vec(), excluded.clone()));
            Ok(self
                .local_search_result
                .clone()
                .unwrap_or_else(|| LocalSearchResult { clusters: seed.to_vec(), objective: self.instance.profit_of(seed) }))
        }

        fn relaxed_bound(&mut self) -> f64 {
            self.instance.clusters.iter().map(|c| c.profit).sum()
        }

        fn relaxed_arrival_times(&mut self, candidate: &[usize]) -> Result<Vec<(usize, f64)>, OracleError> {
            if self.relaxation_fails {
                return Err(OracleError::RelaxationInfeasible);
            }
            Ok(candidate.iter().map(|&c| (c, c as f64)).collect())
        }

        fn name(&self) -> &str {
            "Subset"
        }
    }

    /// Records the weights reported per iteration and optionally cancels after `cancel_after`
    struct Recorder {
        weights: Rc<RefCell<Vec<(f64, Option<f64>)>>>,
        cancel: Option<(Arc<AtomicBool>, usize)>,
        finished: Rc<RefCell<bool>>,
    }

    impl SearchObserver for Recorder {
        fn on_iteration(&mut self, record: &IterationRecord) {
            let mut weights = self.weights.borrow_mut();
            weights.push((record.destroy_weight, record.repair_weight));
            if let Some((flag, after)) = &self.cancel {
                if weights.len() >= *after {
                    flag.store(true, Ordering::Relaxed);
                }
            }
        }

        fn on_finish(&mut self, _: &SearchOutcome) {
            *self.finished.borrow_mut() = true;
        }
    }

    /// Keeps every segment record
    struct SegmentLog {
        records: Rc<RefCell<Vec<SegmentRecord>>>,
    }

    impl SearchObserver for SegmentLog {
        fn on_segment(&mut self, record: &SegmentRecord) {
            self.records.borrow_mut().push(record.clone());
        }
    }

    fn one_segment_config() -> AlnsConfig {
        AlnsConfig { max_segments: 1, ..small_config() }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let instance = create_test_instance();
        let config = AlnsConfig { alpha: 1.5, ..Default::default() };
        let result = AlnsSearch::new(&instance, ScheduleOracle::new(&instance), config);
        assert!(matches!(result, Err(SearchError::Config(e)) if e.name == "alpha"));
    }

    #[test]
    fn test_empty_instance_is_rejected() {
        let nodes = vec![Node::waypoint(0, 0.0, 0.0), Node::waypoint(1, 1.0, 0.0)];
        let instance = CTOPInstance::new("empty", nodes, vec![Vehicle::new(0, [1])], vec![], 0, 1, 10.0).unwrap();
        let result = AlnsSearch::new(&instance, ScheduleOracle::new(&instance), AlnsConfig::default());
        assert!(matches!(result, Err(SearchError::EmptyInstance)));
    }

    #[test]
    fn test_search_finds_best_feasible_set() {
        init();
        let instance = create_test_instance_with_budget(14.0);
        let mut search = AlnsSearch::new(&instance, ScheduleOracle::new(&instance), small_config()).unwrap();
        let outcome = search.run().unwrap();

        assert_eq!(outcome.objective, 16.0);
        assert!(outcome.best.same_set(&Solution::from_clusters([0, 1])));
        assert!(outcome.verified);
        assert!(!outcome.status.is_interrupted());
        assert_eq!(outcome.history.len(), outcome.segments);
        assert!(outcome.history.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_search_is_reproducible() {
        let instance = create_test_instance_with_budget(14.0);
        let config = AlnsConfig { local_search_time: Duration::ZERO, ..small_config() };

        let run = || {
            let mut search = AlnsSearch::new(&instance, ScheduleOracle::new(&instance), config.clone()).unwrap();
            let weights = Rc::new(RefCell::new(Vec::new()));
            search.add_observer(Box::new(Recorder {
                weights: Rc::clone(&weights),
                cancel: None,
                finished: Rc::new(RefCell::new(false)),
            }));
            let outcome = search.run().unwrap();
            let weights = weights.borrow().clone();
            (outcome.best, outcome.iterations, weights)
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_repaired_iteration_is_never_global_best() {
        let instance = three_cluster_instance();
        let oracle = SubsetOracle::new(&instance, &[0, 1]);
        let mut search = AlnsSearch::new(&instance, oracle, AlnsConfig::default()).unwrap();
        let mut state = SearchState::new(Solution::from_clusters([0, 1]), 10.0, 1);
        search.annealing.reset(30.0);

        let record = search
            .iterate(&mut state, DestroyMethod::GreedyProfit, RepairMethod::HighCostRemoval, Duration::ZERO)
            .unwrap();

        assert!(record.repaired);
        assert_eq!(record.new_solution.key(), vec![0, 1]);
        assert_eq!(record.new_objective, Some(10.0));
        assert_ne!(record.outcome, Outcome::NewGlobalBest);
        assert!(matches!(record.outcome, Outcome::WorseAccepted | Outcome::WorseRejected));
        assert_eq!(record.repair.as_deref(), Some("high-cost-removal"));
        assert_eq!(state.global_best_objective, 10.0);

        // score 1 for an accepted equal solution: 0.8 * 1 + 0.2 * 1
        assert!((record.destroy_weight - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unrepairable_candidate_is_rejected_and_punished() {
        let instance = three_cluster_instance();
        let oracle = SubsetOracle::new(&instance, &[]);
        let mut search = AlnsSearch::new(&instance, oracle, AlnsConfig::default()).unwrap();
        let mut state = SearchState::new(Solution::new(), 0.0, 1);
        search.annealing.reset(30.0);

        let record = search
            .iterate(&mut state, DestroyMethod::GreedyCost, RepairMethod::WorstRemoval, Duration::ZERO)
            .unwrap();

        assert_eq!(record.outcome, Outcome::WorseRejected);
        assert!(record.new_objective.is_none());
        assert!(state.current.is_empty());
        // cluster 0 is the cheapest and was downscaled by cooldown and failure_gamma
        let p = search.roulette().probability(0).unwrap();
        assert!((p - 0.9 * 0.1).abs() < 1e-12);
        // worst score 0 with lambda 0.8
        assert!((record.destroy_weight - 0.8).abs() < 1e-12);
        assert_eq!(record.repair_weight, Some(0.8));
    }

    #[test]
    fn test_frozen_weights_never_change() {
        let instance = create_test_instance();
        let config = AlnsConfig {
            lambda: 1.0,
            segment_size: 100,
            max_segments: 1,
            max_iterations_without_improvement: 1000,
            ..small_config()
        };
        let mut search = AlnsSearch::new(&instance, ScheduleOracle::new(&instance), config).unwrap();
        let weights = Rc::new(RefCell::new(Vec::new()));
        search.add_observer(Box::new(Recorder {
            weights: Rc::clone(&weights),
            cancel: None,
            finished: Rc::new(RefCell::new(false)),
        }));
        let outcome = search.run().unwrap();

        assert_eq!(outcome.iterations, 100);
        let weights = weights.borrow();
        assert_eq!(weights.len(), 100);
        for (destroy, repair) in weights.iter() {
            assert_eq!(*destroy, 1.0);
            assert!(repair.map_or(true, |w| w == 1.0));
        }
        assert!(outcome.destroy_weights.iter().all(|(_, w)| *w == 1.0));
        assert!(outcome.repair_weights.iter().all(|(_, w)| *w == 1.0));
    }

    #[test]
    fn test_cancel_before_run_is_interrupted() {
        let instance = create_test_instance();
        let mut search = AlnsSearch::new(&instance, ScheduleOracle::new(&instance), small_config()).unwrap();
        search.cancel_flag().store(true, Ordering::Relaxed);
        let outcome = search.run().unwrap();

        assert_eq!(outcome.status, SearchStatus::Interrupted);
        assert_eq!(outcome.segments, 0);
        assert_eq!(outcome.iterations, 0);
        // the constructive solution is still reported
        assert_eq!(outcome.objective, 20.0);
        assert!(outcome.verified);
    }

    #[test]
    fn test_cancel_mid_segment() {
        let instance = create_test_instance_with_budget(14.0);
        let flag = Arc::new(AtomicBool::new(false));
        let mut search = AlnsSearch::new(&instance, ScheduleOracle::new(&instance), small_config())
            .unwrap()
            .with_cancel_flag(Arc::clone(&flag));
        let finished = Rc::new(RefCell::new(false));
        search.add_observer(Box::new(Recorder {
            weights: Rc::new(RefCell::new(Vec::new())),
            cancel: Some((flag, 5)),
            finished: Rc::clone(&finished),
        }));
        let outcome = search.run().unwrap();

        assert!(outcome.status.is_interrupted());
        assert_eq!(outcome.iterations, 5);
        assert!(*finished.borrow());
    }

    #[test]
    fn test_infeasible_relaxation_is_fatal() {
        let instance = three_cluster_instance();
        let mut oracle = SubsetOracle::new(&instance, &[0, 1]);
        oracle.relaxation_fails = true;
        let config = AlnsConfig::default().with_arrival_time_repair(true);
        let mut search = AlnsSearch::new(&instance, oracle, config).unwrap();

        let err = search
            .repair_to_feasibility(RepairMethod::LatestArrival, &Solution::from_clusters([0, 1, 2]))
            .unwrap_err();
        assert_eq!(err, SearchError::InconsistentRelaxation { clusters: vec![0, 1, 2] });
    }

    #[test]
    fn test_latest_arrival_repair_removes_latest_cluster() {
        let instance = three_cluster_instance();
        let oracle = SubsetOracle::new(&instance, &[0, 1]);
        let config = AlnsConfig::default().with_arrival_time_repair(true);
        let mut search = AlnsSearch::new(&instance, oracle, config).unwrap();
        assert_eq!(search.repair_weights().len(), 6);

        // the mock reports cluster id as arrival time, so cluster 2 is the latest
        let (solution, result) = search
            .repair_to_feasibility(RepairMethod::LatestArrival, &Solution::from_clusters([2, 0, 1]))
            .unwrap();
        assert!(result.feasible);
        assert_eq!(solution.clusters(), &[0, 1]);
    }

    #[test]
    fn test_repair_to_feasibility_restarts_from_original() {
        let instance = three_cluster_instance();
        // only {1} alone is feasible: needs q = 2 removals of the worst ratios
        let oracle = SubsetOracle::new(&instance, &[1]);
        let mut search = AlnsSearch::new(&instance, oracle, AlnsConfig::default()).unwrap();

        let (solution, result) = search
            .repair_to_feasibility(RepairMethod::WorstRemoval, &Solution::from_clusters([0, 1, 2]))
            .unwrap();
        assert!(result.feasible);
        assert_eq!(solution.clusters(), &[1]);
    }

    #[test]
    fn test_rebalance_rewards_and_punishes() {
        let mut dist = WeightedDistribution::new();
        dist.add_weighted('a', "a", 2.0);
        dist.add_weighted('b', "b", 1.0);
        dist.add_weighted('c', "c", 0.5);
        rebalance(&mut dist, 1.5, 0.5);
        assert_eq!(dist.snapshot(), vec![("a".to_string(), 1.5), ("b".to_string(), 1.0), ("c".to_string(), 0.5)]);

        let mut tied = WeightedDistribution::new();
        tied.add('x', "x");
        tied.add('y', "y");
        rebalance(&mut tied, 1.5, 0.5);
        assert_eq!(tied.snapshot(), vec![("x".to_string(), 1.0), ("y".to_string(), 1.0)]);
    }

    #[test]
    fn test_q_wraps_around_cluster_count() {
        let instance = create_test_instance();
        let config = AlnsConfig { q_step: 3, ..Default::default() };
        let search = AlnsSearch::new(&instance, ScheduleOracle::new(&instance), config).unwrap();

        assert_eq!(search.advance_q(1), (4, false));
        assert_eq!(search.advance_q(4), (3, true));
        assert_eq!(search.advance_q(2), (1, true));
    }

    #[test]
    fn test_local_search_result_is_adopted_and_revalidated() {
        init();
        let instance = three_cluster_instance();
        let mut oracle = SubsetOracle::new(&instance, &[0, 1]);
        // construction ends empty, so the first segment must improve
        oracle.reject_first = 1;
        // claims more than the oracle will confirm at the end
        oracle.local_search_result = Some(LocalSearchResult { clusters: vec![1, 0], objective: 12.0 });
        let config = AlnsConfig { nerf_barrier: 0.0, ..one_segment_config() };
        let mut search = AlnsSearch::new(&instance, oracle, config).unwrap();
        let records = Rc::new(RefCell::new(Vec::new()));
        search.add_observer(Box::new(SegmentLog { records: Rc::clone(&records) }));
        let outcome = search.run().unwrap();

        let calls = &search.oracle().local_searches;
        assert_eq!(calls.len(), 1);
        let records = records.borrow();
        assert_eq!(records.len(), 1);
        // with a zero barrier every observed cluster is nerfed and kept out of local search
        let nerfed: HashSet<usize> = records[0].nerfed.iter().copied().collect();
        assert_eq!(calls[0].1, nerfed);
        assert_eq!(nerfed, [0, 1, 2].into_iter().collect());
        assert!(records[0].improved);
        assert_eq!(records[0].local_search_objective, Some(12.0));
        assert_eq!(records[0].global_best_objective, 12.0);

        assert_eq!(outcome.status, SearchStatus::Completed(TerminationReason::MaxSegments));
        assert_eq!(outcome.local_search_improvements, 1);
        assert_eq!(outcome.history, vec![12.0]);
        assert!(outcome.best.same_set(&Solution::from_clusters([0, 1])));
        // re-validation disagrees and its objective wins
        assert!(!outcome.verified);
        assert_eq!(outcome.objective, 10.0);
    }

    #[test]
    fn test_worse_local_search_result_is_ignored() {
        let instance = three_cluster_instance();
        let mut oracle = SubsetOracle::new(&instance, &[0, 1]);
        oracle.reject_first = 1;
        oracle.local_search_result = Some(LocalSearchResult { clusters: vec![], objective: -100.0 });
        let mut search = AlnsSearch::new(&instance, oracle, one_segment_config()).unwrap();
        let records = Rc::new(RefCell::new(Vec::new()));
        search.add_observer(Box::new(SegmentLog { records: Rc::clone(&records) }));
        let outcome = search.run().unwrap();

        assert_eq!(search.oracle().local_searches.len(), 1);
        let records = records.borrow();
        assert_eq!(records[0].local_search_objective, Some(-100.0));
        assert_eq!(outcome.local_search_improvements, 0);
        assert!(!outcome.best.is_empty());
        assert!(outcome.objective > 0.0);
        assert_eq!(outcome.history, vec![outcome.objective]);
        assert!(outcome.verified);
    }

    #[test]
    fn test_stale_segments_skip_local_search_and_terminate() {
        let instance = three_cluster_instance();
        // construction already reaches the optimum {0, 1}
        let oracle = SubsetOracle::new(&instance, &[0, 1]);
        let config = AlnsConfig {
            segment_size: 5,
            max_segments: 10,
            max_segments_without_improvement: 2,
            ..small_config()
        };
        let mut search = AlnsSearch::new(&instance, oracle, config).unwrap();
        let outcome = search.run().unwrap();

        assert!(search.oracle().local_searches.is_empty());
        assert_eq!(outcome.status, SearchStatus::Completed(TerminationReason::NoImprovement));
        assert_eq!(outcome.segments, 2);
        assert_eq!(outcome.history, vec![10.0, 10.0]);
        assert!(outcome.verified);
    }

    #[test]
    fn test_segment_cap_is_inclusive() {
        let instance = three_cluster_instance();
        let oracle = SubsetOracle::new(&instance, &[0, 1]);
        let config = AlnsConfig {
            segment_size: 2,
            max_segments: 3,
            max_segments_without_improvement: 100,
            ..small_config()
        };
        let mut search = AlnsSearch::new(&instance, oracle, config).unwrap();
        let outcome = search.run().unwrap();

        assert_eq!(outcome.status, SearchStatus::Completed(TerminationReason::MaxSegments));
        assert_eq!(outcome.segments, 3);
        assert_eq!(outcome.iterations, 6);
        assert_eq!(outcome.history.len(), 3);
    }

    #[test]
    fn test_time_limit_stops_before_first_segment() {
        let instance = three_cluster_instance();
        let oracle = SubsetOracle::new(&instance, &[0, 1]);
        let config = small_config().with_time_limit(Duration::from_nanos(1));
        let mut search = AlnsSearch::new(&instance, oracle, config).unwrap();
        let outcome = search.run().unwrap();

        assert_eq!(outcome.status, SearchStatus::Completed(TerminationReason::TimeLimit));
        assert_eq!(outcome.segments, 0);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.objective, 10.0);
        assert!(outcome.verified);
    }

    #[test]
    fn test_q_wrap_ends_segment_when_enabled() {
        let instance = three_cluster_instance();
        let oracle = SubsetOracle::new(&instance, &[0, 1]);
        let config = AlnsConfig {
            segment_size: 100,
            max_iterations_without_improvement: 1000,
            stop_on_q_wrap: true,
            ..one_segment_config()
        };
        let mut search = AlnsSearch::new(&instance, oracle, config).unwrap();
        let outcome = search.run().unwrap();

        // q runs 1, 2, 3 and wraps after the third iteration
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.segments, 1);
    }

    #[test]
    fn test_stalled_segment_ends_early() {
        let instance = three_cluster_instance();
        let oracle = SubsetOracle::new(&instance, &[0, 1]);
        let config = AlnsConfig {
            segment_size: 100,
            max_iterations_without_improvement: 4,
            ..one_segment_config()
        };
        let mut search = AlnsSearch::new(&instance, oracle, config).unwrap();
        let outcome = search.run().unwrap();

        // nothing beats the constructed optimum, so every iteration is stale
        assert_eq!(outcome.iterations, 4);
        assert_eq!(outcome.status, SearchStatus::Completed(TerminationReason::MaxSegments));
    }
}
