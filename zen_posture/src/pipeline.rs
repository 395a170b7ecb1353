// THEORY:
// The `pipeline` module runs the per-frame signal chain for one detection tick:
//
//     KeypointSet -> FeatureExtractor -> ScoringModel (on the worker) -> TemporalSmoother
//
// Its output is a `Report`: either the tick produced a new raw and smoothed score,
// or it held the previous one for a stated reason. The pipeline never touches the
// shared score itself. Committing the result and deciding about alerts belong to
// the scheduler, which owns all mutable state.
//
// Key architectural principles:
// 1.  **Strict sequence**: extraction, prediction and smoothing happen in that order
//     within one call, never interleaved with another tick.
// 2.  **Hold, never reset**: every recoverable failure becomes `Report::Held`. A
//     score, once produced, is never replaced by "no score".
// 3.  **Tick labelled**: the worker's answer must match the tick that asked for it
//     or it is not applied.

use crate::config::PipelineConfig;
use crate::core_modules::feature_extractor::FeatureExtractor;
use crate::core_modules::heuristic_model::HeuristicModel;
use crate::core_modules::keypoint::keypoint::{KeypointSet, Landmark};
use crate::core_modules::scoring_model::ScoringModel;
use crate::core_modules::smoother::{Score, TemporalSmoother, raw_score};
use crate::core_modules::trace::{SmoothingStep, TraceSampler};
use crate::error::{PostureError, PostureResult};
use crate::inference_worker::InferenceWorker;

/// Why a detection tick left the score unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum HoldReason {
    NoDetection,
    MissingKeypoint(Landmark),
    InvalidFrame,
    PredictionFailed(String),
    /// The worker answered for a different tick.
    StaleResult,
    WorkerUnavailable,
}

impl HoldReason {
    fn from_error(error: PostureError) -> Self {
        match error {
            PostureError::MissingKeypoint(landmark) => HoldReason::MissingKeypoint(landmark),
            PostureError::InvalidFrame { .. } => HoldReason::InvalidFrame,
            PostureError::WorkerUnavailable => HoldReason::WorkerUnavailable,
            other => HoldReason::PredictionFailed(other.to_string()),
        }
    }
}

/// The outcome of one detection tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Scored { tick: u64, raw: Score, smoothed: Score },
    Held(HoldReason),
}

pub struct PosturePipeline {
    extractor: FeatureExtractor,
    worker: InferenceWorker,
    smoother: TemporalSmoother,
    trace: TraceSampler,
    /// Set when the heuristic is the active model, for trace breakdowns.
    fallback: Option<HeuristicModel>,
}

impl PosturePipeline {
    pub fn new(config: &PipelineConfig, model: ScoringModel) -> Self {
        let fallback = match &model {
            ScoringModel::Fallback(heuristic) => Some(*heuristic),
            ScoringModel::Trained(_) => None,
        };
        Self {
            extractor: FeatureExtractor::new(config.min_keypoint_confidence),
            worker: InferenceWorker::spawn(model),
            smoother: TemporalSmoother::new(),
            trace: TraceSampler::new(config.trace_every_n_ticks),
            fallback,
        }
    }

    pub fn model_name(&self) -> &'static str {
        self.worker.model_name()
    }

    /// Scores one keypoint set. `previous` is the committed smoothed score, if any.
    pub async fn process(&mut self, tick: u64, keypoints: &KeypointSet, previous: Option<Score>) -> Report {
        match self.score(tick, keypoints, previous).await {
            Ok(report) => report,
            Err(e) => {
                tracing::debug!(tick, error = %e, "Holding previous score");
                Report::Held(HoldReason::from_error(e))
            }
        }
    }

    async fn score(&mut self, tick: u64, keypoints: &KeypointSet, previous: Option<Score>) -> PostureResult<Report> {
        let features = self.extractor.extract(keypoints)?;

        let prediction = self.worker.predict(tick, features).await?;
        if prediction.tick != tick {
            tracing::warn!(tick, answered = prediction.tick, "Discarding prediction for another tick");
            return Ok(Report::Held(HoldReason::StaleResult));
        }

        let raw = raw_score(prediction.score01?);
        let smoothed = self.smoother.smooth(previous, raw);
        self.trace.record(
            tick,
            &features,
            self.worker.model_name(),
            self.fallback.as_ref(),
            SmoothingStep { raw, previous, smoothed },
        );

        Ok(Report::Scored { tick, raw, smoothed })
    }

    /// Drains the worker and returns the model for disposal.
    pub async fn shutdown(self) -> PostureResult<ScoringModel> {
        self.worker.shutdown().await
    }
}
