// THEORY:
// The `TrainedModel` is the learned half of the dual scoring strategy: a small
// fully-connected network trained offline on labelled posture recordings.
//
//     7 features -> dense(16, relu) -> dense(16, relu) -> dense(1, sigmoid)
//
// The sigmoid output is already the [0, 1] score the scoring contract asks for.
//
// Weights arrive as one JSON document holding six tensors, in layer order:
// kernel1 [7x16], bias1 [16], kernel2 [16x16], bias2 [16], kernel3 [16x1], bias3 [1].
// Exporters disagree on how a tensor is spelled, so each one may be a flat array, a
// nested row-major array, or an object keyed by element (or row) index. Anything
// that does not decode to exactly those shapes is rejected as `ModelUnavailable`;
// a half-loaded network is never constructed.

use crate::core_modules::feature_extractor::{FEATURE_COUNT, FeatureVector};
use crate::error::{PostureError, PostureResult};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const HIDDEN_UNITS: usize = 16;
const OUTPUT_UNITS: usize = 1;
const TENSOR_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Sigmoid,
}

impl Activation {
    fn apply(&self, value: f64) -> f64 {
        match self {
            Activation::Relu => value.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-value).exp()),
        }
    }
}

/// One fully-connected layer. `kernel` is row-major `[inputs x outputs]`.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    inputs: usize,
    outputs: usize,
    kernel: Vec<f64>,
    bias: Vec<f64>,
    activation: Activation,
}

impl DenseLayer {
    pub fn new(
        inputs: usize,
        outputs: usize,
        kernel: Vec<f64>,
        bias: Vec<f64>,
        activation: Activation,
    ) -> PostureResult<Self> {
        if kernel.len() != inputs * outputs {
            return Err(PostureError::model_unavailable(format!(
                "kernel has {} values, expected {inputs}x{outputs}",
                kernel.len()
            )));
        }
        if bias.len() != outputs {
            return Err(PostureError::model_unavailable(format!(
                "bias has {} values, expected {outputs}",
                bias.len()
            )));
        }
        if kernel.iter().chain(bias.iter()).any(|w| !w.is_finite()) {
            return Err(PostureError::model_unavailable("weights contain non-finite values"));
        }
        Ok(Self {
            inputs,
            outputs,
            kernel,
            bias,
            activation,
        })
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        (0..self.outputs)
            .map(|out| {
                let weighted: f64 = input
                    .iter()
                    .enumerate()
                    .map(|(i, x)| x * self.kernel[i * self.outputs + out])
                    .sum();
                self.activation.apply(weighted + self.bias[out])
            })
            .collect()
    }
}

/// One tensor as an exporter may have written it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TensorValues {
    Flat(Vec<f64>),
    Nested(Vec<Vec<f64>>),
    Keyed(BTreeMap<String, f64>),
    KeyedRows(BTreeMap<String, Vec<f64>>),
}

impl TensorValues {
    fn into_flat(self) -> PostureResult<Vec<f64>> {
        match self {
            TensorValues::Flat(values) => Ok(values),
            TensorValues::Nested(rows) => Ok(rows.into_iter().flatten().collect()),
            TensorValues::Keyed(map) => Ok(sort_by_index(map)?.into_iter().collect()),
            TensorValues::KeyedRows(map) => Ok(sort_by_index(map)?.into_iter().flatten().collect()),
        }
    }
}

fn sort_by_index<T>(map: BTreeMap<String, T>) -> PostureResult<Vec<T>> {
    let mut indexed = map
        .into_iter()
        .map(|(key, value)| {
            key.parse::<usize>()
                .map(|index| (index, value))
                .map_err(|_| PostureError::model_unavailable(format!("tensor key '{key}' is not an index")))
        })
        .collect::<PostureResult<Vec<_>>>()?;
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, value)| value).collect())
}

/// The learned posture scorer.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    layers: Vec<DenseLayer>,
}

impl TrainedModel {
    /// Builds the network from the six weight tensors, in layer order.
    pub fn from_tensors(tensors: Vec<Vec<f64>>) -> PostureResult<Self> {
        if tensors.len() != TENSOR_COUNT {
            return Err(PostureError::model_unavailable(format!(
                "weights document holds {} tensors, expected {TENSOR_COUNT}",
                tensors.len()
            )));
        }
        let mut tensors = tensors.into_iter();
        let mut next = || tensors.next().unwrap_or_default();

        let layers = vec![
            DenseLayer::new(FEATURE_COUNT, HIDDEN_UNITS, next(), next(), Activation::Relu)?,
            DenseLayer::new(HIDDEN_UNITS, HIDDEN_UNITS, next(), next(), Activation::Relu)?,
            DenseLayer::new(HIDDEN_UNITS, OUTPUT_UNITS, next(), next(), Activation::Sigmoid)?,
        ];
        Ok(Self { layers })
    }

    /// Decodes a weights document (see module docs for the accepted layouts).
    pub fn from_json(document: &str) -> PostureResult<Self> {
        let raw: Vec<TensorValues> = serde_json::from_str(document)
            .map_err(|e| PostureError::model_unavailable(format!("malformed weights document: {e}")))?;
        let tensors = raw
            .into_iter()
            .map(TensorValues::into_flat)
            .collect::<PostureResult<Vec<_>>>()?;
        Self::from_tensors(tensors)
    }

    /// Score in [0, 1], or `PredictionFailed` when the network produces no usable value.
    pub fn predict(&self, features: &FeatureVector) -> PostureResult<f64> {
        let input = features.as_array();
        if input.iter().any(|v| !v.is_finite()) {
            return Err(PostureError::prediction_failed("feature vector contains non-finite values"));
        }

        let output = self
            .layers
            .iter()
            .fold(input.to_vec(), |activations, layer| layer.forward(&activations));

        match output.first() {
            Some(score) if score.is_finite() => Ok(score.clamp(0.0, 1.0)),
            Some(score) => Err(PostureError::prediction_failed(format!("network produced {score}"))),
            None => Err(PostureError::prediction_failed("network produced no output")),
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| layer.inputs * layer.outputs + layer.bias.len())
            .sum()
    }
}
