use std::str::FromStr;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::infer::result::{BinaryHead, ClipTensor, FeatureEmbedding, Prediction};

/// How a loaded network may be used.
///
/// Backends are built for inference only: weights are read once at load and
/// never updated. The mode is fixed at construction and reported back for
/// logging; there is no training mode to select.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    InferenceOnly,
}

/// Which implementation family loads the checkpoints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Pure-Rust pooled extractor and logistic head, JSON checkpoints.
    #[default]
    Native,
    /// ONNX checkpoints run through tract (feature `backend-tract`).
    Tract,
}

impl FromStr for BackendKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "tract" | "onnx" => Ok(Self::Tract),
            other => Err(PipelineError::Config(format!(
                "unknown model backend '{}' (expected native or tract)",
                other
            ))),
        }
    }
}

/// Frozen clip feature extractor.
///
/// Implementations must be deterministic: the same tensor always yields the
/// same embedding.
pub trait FeatureExtractor: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn execution_mode(&self) -> ExecutionMode;

    /// Length of every embedding this extractor returns.
    fn embedding_dim(&self) -> usize;

    /// Forward pass over one preprocessed clip.
    fn extract(&self, clip: &ClipTensor) -> Result<FeatureEmbedding, PipelineError>;
}

/// Frozen binary classification head.
pub trait Classifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn execution_mode(&self) -> ExecutionMode;

    /// Embedding length this head accepts.
    fn input_dim(&self) -> usize;

    /// Label set and decision threshold.
    fn head(&self) -> &BinaryHead;

    /// Probability of the positive class.
    fn score(&self, embedding: &FeatureEmbedding) -> Result<f32, PipelineError>;

    /// Classify one embedding.
    fn classify(&self, embedding: &FeatureEmbedding) -> Result<Prediction, PipelineError> {
        if embedding.len() != self.input_dim() {
            return Err(PipelineError::Inference(format!(
                "embedding has {} values, classifier expects {}",
                embedding.len(),
                self.input_dim()
            )));
        }
        let positive = self.score(embedding)?;
        self.head().decide(positive)
    }
}
