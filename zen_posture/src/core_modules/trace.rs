// THEORY:
// The `TraceSampler` is the engine's only debugging hook inside the hot path. At ten
// ticks per second, logging every feature vector would drown everything else, so
// detailed traces are emitted for one tick in every N. The decision is a plain
// counter: it is deterministic, it never influences scoring, and N = 0 turns the
// hook off entirely.

use crate::core_modules::feature_extractor::FeatureVector;
use crate::core_modules::heuristic_model::HeuristicModel;
use crate::core_modules::smoother::Score;

/// How one tick moved the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmoothingStep {
    pub raw: Score,
    pub previous: Option<Score>,
    pub smoothed: Score,
}

#[derive(Debug, Clone)]
pub struct TraceSampler {
    every_n_ticks: u64,
    seen: u64,
}

impl TraceSampler {
    pub fn new(every_n_ticks: u64) -> Self {
        Self {
            every_n_ticks,
            seen: 0,
        }
    }

    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Counts one tick; true when this tick should be traced.
    pub fn sample(&mut self) -> bool {
        if self.every_n_ticks == 0 {
            return false;
        }
        self.seen += 1;
        self.seen % self.every_n_ticks == 0
    }

    /// Emits the detailed trace for a scored tick, if this tick is sampled.
    /// `fallback` is the heuristic when it is the active model, for its sub-scores.
    pub fn record(
        &mut self,
        tick: u64,
        features: &FeatureVector,
        model: &'static str,
        fallback: Option<&HeuristicModel>,
        step: SmoothingStep,
    ) {
        if !self.sample() {
            return;
        }

        tracing::debug!(tick, features = ?features.as_array(), model, "Feature vector");
        if let Some(heuristic) = fallback {
            let breakdown = heuristic.breakdown(features);
            tracing::debug!(
                tick,
                neck_tilt = breakdown.neck_tilt,
                distance = breakdown.distance,
                ratio = breakdown.ratio,
                ear = breakdown.ear,
                shoulder = breakdown.shoulder,
                combined = breakdown.combined,
                "Heuristic score breakdown"
            );
        }
        tracing::debug!(
            tick,
            raw = step.raw,
            previous = ?step.previous,
            smoothed = step.smoothed,
            "Score smoothing"
        );
    }
}
