// THEORY:
// Every failure the posture engine can meet is described here, in one enum.
// None of them are fatal. The detection tick holds the previous score when a
// frame cannot be scored, model selection degrades to the heuristic when the
// trained network cannot be loaded, and the slower ticks log sink failures and
// carry on. `is_recoverable` names the per-tick subset that only ever results
// in "no update this tick".

use crate::core_modules::keypoint::keypoint::Landmark;
use thiserror::Error;

/// Result type alias for posture engine operations.
pub type PostureResult<T> = Result<T, PostureError>;

/// Errors produced by the posture engine and its collaborators.
#[derive(Error, Debug)]
pub enum PostureError {
    /// A required landmark was absent or below the confidence threshold.
    #[error("Missing required keypoint: {0}")]
    MissingKeypoint(Landmark),

    /// The frame the keypoints were measured in has no area.
    #[error("Invalid frame dimensions: {width}x{height}")]
    InvalidFrame { width: f64, height: f64 },

    /// The trained scoring model could not be produced.
    #[error("Trained model unavailable: {0}")]
    ModelUnavailable(String),

    /// The active scoring model failed while scoring one feature vector.
    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    /// The inference worker has stopped and cannot accept work.
    #[error("Inference worker is not running")]
    WorkerUnavailable,

    /// A scheduler task ended abnormally.
    #[error("Scheduler task failed: {0}")]
    TaskFailed(String),

    /// A configuration value was rejected.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A persistence or notification collaborator reported a failure.
    #[error("Sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),
}

impl PostureError {
    pub fn model_unavailable<S: Into<String>>(msg: S) -> Self {
        PostureError::ModelUnavailable(msg.into())
    }

    pub fn prediction_failed<S: Into<String>>(msg: S) -> Self {
        PostureError::PredictionFailed(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        PostureError::Config(msg.into())
    }

    pub fn sink<S: Into<String>>(msg: S) -> Self {
        PostureError::Sink(msg.into())
    }

    /// True for failures that only cost the current detection tick its update.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PostureError::MissingKeypoint(_)
                | PostureError::InvalidFrame { .. }
                | PostureError::PredictionFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_tick_failures_are_recoverable() {
        assert!(PostureError::MissingKeypoint(Landmark::Nose).is_recoverable());
        assert!(PostureError::InvalidFrame { width: 0.0, height: 480.0 }.is_recoverable());
        assert!(PostureError::prediction_failed("nan").is_recoverable());
        assert!(!PostureError::model_unavailable("missing weights").is_recoverable());
        assert!(!PostureError::sink("offline").is_recoverable());
    }

    #[test]
    fn messages_name_the_landmark() {
        let err = PostureError::MissingKeypoint(Landmark::LeftEar);
        assert_eq!(err.to_string(), "Missing required keypoint: left_ear");
    }
}
