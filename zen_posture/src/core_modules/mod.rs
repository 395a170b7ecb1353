pub mod alert_policy;
pub mod feature_extractor;
pub mod geometry;
pub mod heuristic_model;
pub mod keypoint;
pub mod scoring_model;
pub mod smoother;
pub mod trace;
pub mod trained_model;
