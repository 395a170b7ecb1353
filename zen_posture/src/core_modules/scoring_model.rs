// THEORY:
// The `scoring_model` module is the seam between the geometric features and the
// posture score. Callers only ever see `ScoringModel`, a tagged variant with exactly
// two implementations:
//
// - `Trained`: the learned network. Better scores, but it depends on a weights
//   resource that may be missing or malformed, and on a network that may have been
//   exported wrong.
// - `Fallback`: the closed-form heuristic. Always constructible.
//
// Selection happens exactly once, at startup, in `select_model`. The trained network
// is loaded, then probed with three reference postures; a network that scores them
// all as zero, or all identically, is not scoring anything and is discarded. Any
// failure along the way degrades the session to the heuristic and raises the
// degraded flag. There is no way back to the trained model within a session.

use crate::core_modules::feature_extractor::FeatureVector;
use crate::core_modules::heuristic_model::HeuristicModel;
use crate::core_modules::trained_model::TrainedModel;
use crate::error::{PostureError, PostureResult};

/// Good, medium and bad reference postures used to probe a freshly loaded network.
pub const VERIFICATION_PROBES: [[f64; 7]; 3] = [
    [0.17, 0.4, 170.0, 0.15, 0.15, 50.0, 50.0],
    [0.13, 0.6, 150.0, 0.22, 0.22, 40.0, 40.0],
    [0.08, 0.85, 120.0, 0.3, 0.3, 25.0, 25.0],
];

/// Produces a trained model from some opaque weights resource.
pub trait ModelLoader {
    /// Human-readable description of where the weights come from, for logs.
    fn describe(&self) -> String;

    fn load(&self) -> PostureResult<TrainedModel>;
}

/// Loads the network from an in-memory JSON weights document.
#[derive(Debug, Clone)]
pub struct JsonWeightsLoader {
    origin: String,
    document: String,
}

impl JsonWeightsLoader {
    pub fn new(origin: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            document: document.into(),
        }
    }
}

impl ModelLoader for JsonWeightsLoader {
    fn describe(&self) -> String {
        self.origin.clone()
    }

    fn load(&self) -> PostureResult<TrainedModel> {
        TrainedModel::from_json(&self.document)
    }
}

/// A loader that always fails, for sessions with no weights resource at all.
#[derive(Debug, Clone)]
pub struct Unavailable(pub String);

impl ModelLoader for Unavailable {
    fn describe(&self) -> String {
        "none".to_string()
    }

    fn load(&self) -> PostureResult<TrainedModel> {
        Err(PostureError::model_unavailable(self.0.clone()))
    }
}

/// The active posture scorer.
#[derive(Debug, Clone)]
pub enum ScoringModel {
    Trained(TrainedModel),
    Fallback(HeuristicModel),
}

impl ScoringModel {
    /// Score in [0, 1].
    pub fn predict(&self, features: &FeatureVector) -> PostureResult<f64> {
        match self {
            ScoringModel::Trained(model) => model.predict(features),
            ScoringModel::Fallback(model) => Ok(model.predict(features)),
        }
    }

    pub fn is_trained(&self) -> bool {
        matches!(self, ScoringModel::Trained(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScoringModel::Trained(_) => "trained_model",
            ScoringModel::Fallback(_) => "fallback_heuristic_model",
        }
    }

    /// Releases the model. Must only be called once no tick can reach it any more.
    pub fn dispose(self) {
        tracing::info!(model = self.name(), "Disposing scoring model");
        drop(self);
    }
}

/// The outcome of startup model selection.
#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub model: ScoringModel,
    /// Set when the heuristic is in use because the trained model could not be.
    pub degraded: bool,
    /// Why the session is degraded, if it is.
    pub reason: Option<String>,
}

impl ModelSelection {
    pub fn trained(model: TrainedModel) -> Self {
        Self {
            model: ScoringModel::Trained(model),
            degraded: false,
            reason: None,
        }
    }

    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            model: ScoringModel::Fallback(HeuristicModel::new()),
            degraded: true,
            reason: Some(reason.into()),
        }
    }
}

/// Picks the scoring model for the session.
pub fn select_model(loader: &dyn ModelLoader) -> ModelSelection {
    tracing::info!(source = %loader.describe(), "Loading posture scoring model");

    let model = match loader.load() {
        Ok(model) => model,
        Err(e) => {
            tracing::warn!(error = %e, "Could not load trained model, using fallback");
            return ModelSelection::fallback(e.to_string());
        }
    };

    match verify(&model) {
        Ok(outputs) => {
            let [good, medium, bad] = outputs.map(|o| (o * 100.0).round() as u8);
            tracing::info!(
                parameters = model.parameter_count(),
                good,
                medium,
                bad,
                "Trained model verified"
            );
            ModelSelection::trained(model)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Trained model failed verification, using fallback");
            ModelSelection::fallback(e.to_string())
        }
    }
}

/// Runs the reference postures through a freshly loaded network; returns its raw outputs if it
/// discriminates. Outputs are compared exactly, so close but distinct values pass.
pub fn verify(model: &TrainedModel) -> PostureResult<[f64; 3]> {
    let mut outputs = [0.0; 3];
    for (slot, probe) in outputs.iter_mut().zip(VERIFICATION_PROBES.iter()) {
        *slot = model.predict(&FeatureVector::from(*probe))?;
    }

    if outputs.iter().all(|o| *o == 0.0) {
        return Err(PostureError::model_unavailable("verification: all predictions are zero"));
    }
    if outputs.windows(2).all(|w| w[0] == w[1]) {
        return Err(PostureError::model_unavailable(
            "verification: predictions are identical for different postures",
        ));
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::feature_extractor::FEATURE_COUNT;
    use crate::core_modules::trained_model::HIDDEN_UNITS;
    use crate::core_modules::trained_model::tests::pass_through_tensors;

    fn document(tensors: Vec<Vec<f64>>) -> String {
        serde_json::to_string(&tensors).unwrap()
    }

    #[test]
    fn discriminating_network_is_selected() {
        // Output depends on dist_nose_shoulders, which differs across the probes.
        let loader = JsonWeightsLoader::new("memory", document(pass_through_tensors(-1.0)));
        let selection = select_model(&loader);
        assert!(selection.model.is_trained());
        assert!(!selection.degraded);
        assert!(selection.reason.is_none());
    }

    #[test]
    fn missing_weights_degrade_to_fallback() {
        let selection = select_model(&Unavailable("no weights configured".into()));
        assert!(!selection.model.is_trained());
        assert!(selection.degraded);
        assert!(selection.reason.unwrap().contains("no weights configured"));
    }

    #[test]
    fn malformed_weights_degrade_to_fallback() {
        let selection = select_model(&JsonWeightsLoader::new("memory", "[[1.0, 2.0]]"));
        assert_eq!(selection.model.name(), "fallback_heuristic_model");
        assert!(selection.degraded);
    }

    #[test]
    fn constant_network_fails_verification() {
        let tensors = vec![
            vec![0.0; FEATURE_COUNT * HIDDEN_UNITS],
            vec![0.0; HIDDEN_UNITS],
            vec![0.0; HIDDEN_UNITS * HIDDEN_UNITS],
            vec![0.0; HIDDEN_UNITS],
            vec![0.0; HIDDEN_UNITS],
            vec![0.3],
        ];
        let model = TrainedModel::from_tensors(tensors.clone()).unwrap();
        let err = verify(&model).unwrap_err();
        assert!(err.to_string().contains("identical"));

        let selection = select_model(&JsonWeightsLoader::new("memory", document(tensors)));
        assert!(selection.degraded);
    }

    #[test]
    fn all_zero_network_fails_verification() {
        let mut tensors = pass_through_tensors(0.0);
        // Large enough for the sigmoid to reach exactly zero.
        tensors[5] = vec![-1000.0];
        let model = TrainedModel::from_tensors(tensors).unwrap();
        let err = verify(&model).unwrap_err();
        assert!(err.to_string().contains("zero"));
    }

    #[test]
    fn close_but_distinct_outputs_pass_verification() {
        // Every reference posture rounds to a score of 50, yet the raw outputs differ.
        let mut tensors = pass_through_tensors(0.0);
        tensors[4][0] = 0.1;
        let model = TrainedModel::from_tensors(tensors.clone()).unwrap();
        let outputs = verify(&model).unwrap();
        assert!(outputs.iter().all(|o| (o * 100.0).round() == 50.0));
        assert!(outputs[0] != outputs[1] && outputs[1] != outputs[2]);

        let selection = select_model(&JsonWeightsLoader::new("memory", document(tensors)));
        assert!(selection.model.is_trained());
        assert!(!selection.degraded);
    }

    #[test]
    fn fallback_always_predicts() {
        let model = ScoringModel::Fallback(HeuristicModel::new());
        let p = model.predict(&FeatureVector::default()).unwrap();
        assert!((0.0..=1.0).contains(&p));
        model.dispose();
    }
}
