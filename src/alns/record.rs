//! Search telemetry: per-iteration and per-segment records, the final outcome
//! and the observers that consume them.

use super::acceptance::Outcome;
use crate::solution::Solution;
use indicatif::{ProgressBar, ProgressStyle};
use log::Level;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

/// Everything that happened in one ALNS iteration
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub segment: usize,
    pub iteration: usize,
    pub elapsed_secs: f64,
    pub destroy: String,
    pub destroy_weight: f64,
    /// Set only when a repair step ran
    pub repair: Option<String>,
    pub repair_weight: Option<f64>,
    pub temperature: f64,
    /// Missing when the candidate never became feasible
    pub barrier: Option<f64>,
    pub q: usize,
    pub old_solution: Solution,
    pub old_objective: f64,
    pub new_solution: Solution,
    pub new_objective: Option<f64>,
    pub segment_best: Solution,
    pub segment_best_objective: f64,
    pub global_best: Solution,
    pub global_best_objective: f64,
    pub outcome: Outcome,
    pub accepted: bool,
    pub repaired: bool,
    pub roulette: Vec<f64>,
    pub comment: String,
}

/// Summary written at the end of a segment
#[derive(Debug, Clone, Serialize)]
pub struct SegmentRecord {
    pub segment: usize,
    pub iterations: usize,
    pub elapsed_secs: f64,
    pub final_temperature: f64,
    pub global_best: Solution,
    pub global_best_objective: f64,
    /// Whether the segment raised the global best
    pub improved: bool,
    pub destroy_weights: Vec<(String, f64)>,
    pub repair_weights: Vec<(String, f64)>,
    /// Clusters switched off by the roulette reset
    pub nerfed: Vec<usize>,
    /// Objective returned by the local search, if it ran
    pub local_search_objective: Option<f64>,
    pub roulette: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminationReason {
    TimeLimit,
    MaxSegments,
    NoImprovement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchStatus {
    Completed(TerminationReason),
    /// Cancelled through the cancel flag; the best solution is still reported
    Interrupted,
}

impl SearchStatus {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, SearchStatus::Interrupted)
    }
}

/// Result of a complete search run
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub best: Solution,
    pub objective: f64,
    pub status: SearchStatus,
    pub segments: usize,
    pub iterations: usize,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    pub local_search_improvements: usize,
    pub destroy_weights: Vec<(String, f64)>,
    pub repair_weights: Vec<(String, f64)>,
    /// Global-best objective after each segment
    pub history: Vec<f64>,
    /// Whether the final re-validation by the oracle agreed with the search
    pub verified: bool,
    /// RFC 3339
    pub started_at: String,
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

/// Coarse 0–100 estimate: the further along of time and segment budgets
pub fn progress_estimate(elapsed: Duration, time_limit: Duration, segments: usize, max_segments: usize) -> u8 {
    let by_time = if time_limit.is_zero() {
        1.0
    } else {
        elapsed.as_secs_f64() / time_limit.as_secs_f64()
    };
    let by_segments = if max_segments == 0 {
        1.0
    } else {
        segments as f64 / max_segments as f64
    };
    (by_time.max(by_segments) * 100.0).clamp(0.0, 100.0) as u8
}

/// Receives the search telemetry. Every hook defaults to a no-op.
pub trait SearchObserver {
    fn on_iteration(&mut self, _record: &IterationRecord) {}
    fn on_segment(&mut self, _record: &SegmentRecord) {}
    fn on_progress(&mut self, _percent: u8) {}
    fn on_finish(&mut self, _outcome: &SearchOutcome) {}
}

/// Forwards records to the `log` facade
pub struct LogObserver {
    pub level: Level,
}

impl LogObserver {
    pub fn new(level: Level) -> Self {
        LogObserver { level }
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        Self::new(Level::Debug)
    }
}

impl SearchObserver for LogObserver {
    fn on_iteration(&mut self, r: &IterationRecord) {
        log::log!(
            self.level,
            "[{}:{}] {} / {} q={} T={:.3} {:?} obj={:?} best={:.2} {}",
            r.segment,
            r.iteration,
            r.destroy,
            r.repair.as_deref().unwrap_or("-"),
            r.q,
            r.temperature,
            r.outcome,
            r.new_objective,
            r.global_best_objective,
            r.comment
        );
    }

    fn on_segment(&mut self, r: &SegmentRecord) {
        log::log!(
            self.level,
            "segment {} done after {} iterations: best {:.2} (improved: {}), {} nerfed",
            r.segment,
            r.iterations,
            r.global_best_objective,
            r.improved,
            r.nerfed.len()
        );
    }

    fn on_finish(&mut self, outcome: &SearchOutcome) {
        log::log!(
            self.level,
            "search finished ({:?}) with {} after {:.2}s",
            outcome.status,
            outcome.objective,
            outcome.elapsed.as_secs_f64()
        );
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Entry<'a> {
    Iteration(&'a IterationRecord),
    Segment(&'a SegmentRecord),
    Finish(&'a SearchOutcome),
}

/// Appends one JSON object per record to a writer
pub struct JsonLinesObserver<W: Write> {
    writer: W,
    failed: bool,
}

impl<W: Write> JsonLinesObserver<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesObserver { writer, failed: false }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn append(&mut self, entry: Entry<'_>) {
        if self.failed {
            return;
        }
        let result = serde_json::to_writer(&mut self.writer, &entry)
            .map_err(std::io::Error::from)
            .and_then(|_| self.writer.write_all(b"\n"))
            .and_then(|_| self.writer.flush());
        if let Err(e) = result {
            log::warn!("telemetry log disabled after write error: {}", e);
            self.failed = true;
        }
    }
}

impl<W: Write> SearchObserver for JsonLinesObserver<W> {
    fn on_iteration(&mut self, record: &IterationRecord) {
        self.append(Entry::Iteration(record));
    }

    fn on_segment(&mut self, record: &SegmentRecord) {
        self.append(Entry::Segment(record));
    }

    fn on_finish(&mut self, outcome: &SearchOutcome) {
        self.append(Entry::Finish(outcome));
    }
}

/// Terminal progress bar over 0–100
pub struct ProgressBarObserver {
    bar: ProgressBar,
}

impl ProgressBarObserver {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(100))
    }

    /// A bar that never draws
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        if let Ok(style) = ProgressStyle::default_bar().template("[{bar:40}] {pos:>3}% {msg}") {
            bar.set_style(style);
        }
        ProgressBarObserver { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Default for ProgressBarObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchObserver for ProgressBarObserver {
    fn on_segment(&mut self, record: &SegmentRecord) {
        self.bar.set_message(format!("best {:.2}", record.global_best_objective));
    }

    fn on_progress(&mut self, percent: u8) {
        self.bar.set_position(percent as u64);
    }

    fn on_finish(&mut self, outcome: &SearchOutcome) {
        self.bar.set_position(100);
        self.bar.finish_with_message(format!("best {:.2}", outcome.objective));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome() -> SearchOutcome {
        SearchOutcome {
            best: Solution::from_clusters([1, 0]),
            objective: 16.0,
            status: SearchStatus::Completed(TerminationReason::MaxSegments),
            segments: 3,
            iterations: 30,
            elapsed: Duration::from_millis(1500),
            local_search_improvements: 1,
            destroy_weights: vec![("greedy-profit".to_string(), 1.5)],
            repair_weights: vec![("worst-removal".to_string(), 0.5)],
            history: vec![10.0, 16.0, 16.0],
            verified: true,
            started_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_progress_estimate() {
        let limit = Duration::from_secs(10);
        assert_eq!(progress_estimate(Duration::from_secs(2), limit, 1, 10), 20);
        assert_eq!(progress_estimate(Duration::from_secs(1), limit, 5, 10), 50);
        assert_eq!(progress_estimate(Duration::from_secs(30), limit, 0, 10), 100);
        assert_eq!(progress_estimate(Duration::ZERO, limit, 0, 10), 0);
    }

    #[test]
    fn test_json_lines_observer() {
        let mut observer = JsonLinesObserver::new(Vec::new());
        observer.on_finish(&outcome());
        observer.on_finish(&outcome());

        let bytes = observer.into_inner();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["kind"], "finish");
        assert_eq!(value["objective"], 16.0);
        assert_eq!(value["elapsed"], 1.5);
        assert_eq!(value["best"]["clusters"], serde_json::json!([1, 0]));
    }

    #[test]
    fn test_progress_bar_observer() {
        let mut observer = ProgressBarObserver::hidden();
        observer.on_progress(40);
        assert_eq!(observer.position(), 40);
        observer.on_finish(&outcome());
        assert_eq!(observer.position(), 100);
    }
}
