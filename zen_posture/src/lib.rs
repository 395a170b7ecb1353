// THEORY:
// This file is the entry point for the `zen_posture` library crate. It turns a live
// stream of body keypoints into a single, temporally stable posture score in
// [0, 100] and drives user alerts and periodic telemetry from it.
//
// The public surface is deliberately small:
// - `Scheduler::start` plus a `SchedulerHandle` run a full session against
//   caller-supplied collaborators (keypoint source, persistence, notifications,
//   config store).
// - `select_model` picks the scoring model once, at startup.
// - The pure building blocks (`FeatureExtractor`, `ScoringModel`,
//   `TemporalSmoother`, `AlertPolicy`) are exported for callers that want to run
//   the chain themselves.
//
// Everything below `core_modules` is a pure transform. All mutable, shared state
// lives in the scheduler.

pub mod collaborators;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod inference_worker;
pub mod pipeline;
pub mod scheduler;
pub mod state;

pub use collaborators::{
    ChannelKeypointSource, ChannelPersistence, KeypointSource, Notification, NotificationKind, NotificationSink,
    NullPersistence, PersistenceService, PostureSample, TracingNotifier,
};
pub use config::{AppConfig, ConfigStore, MemoryConfigStore, ThresholdConfig, TomlConfigStore};
pub use core_modules::alert_policy::{AlertDecision, AlertPolicy, AlertState};
pub use core_modules::feature_extractor::{FeatureExtractor, FeatureVector};
pub use core_modules::heuristic_model::{HeuristicModel, PostureBand};
pub use core_modules::keypoint::keypoint::{Keypoint, KeypointSet, Landmark};
pub use core_modules::scoring_model::{JsonWeightsLoader, ModelLoader, ModelSelection, ScoringModel, Unavailable, select_model};
pub use core_modules::smoother::{Score, TemporalSmoother};
pub use core_modules::trained_model::TrainedModel;
pub use error::{PostureError, PostureResult};
pub use pipeline::{HoldReason, PosturePipeline, Report};
pub use scheduler::{Collaborators, Scheduler, SchedulerHandle, SchedulerReport};
pub use state::{ScoreReader, ScoreState};
