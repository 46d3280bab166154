#![cfg(feature = "backend-tract")]

use std::path::Path;

use tract_onnx::prelude::*;

use crate::error::PipelineError;
use crate::infer::backend::{Classifier, ExecutionMode, FeatureExtractor};
use crate::infer::result::{BinaryHead, ClipTensor, FeatureEmbedding};

type RunnableModel = TypedRunnableModel<TypedModel>;

fn load_error(path: &Path, stage: &str, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::model_load(path, format!("{}: {}", stage, e))
}

/// Load an ONNX model from disk with a fixed f32 input shape.
///
/// The model is read once; nothing is written back.
fn load_runnable(path: &Path, input_shape: &[usize]) -> Result<RunnableModel, PipelineError> {
    tract_onnx::onnx()
        .model_for_path(path)
        .map_err(|e| load_error(path, "failed to load ONNX model", e))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                input_shape.iter().copied().collect::<TVec<usize>>(),
            ),
        )
        .map_err(|e| load_error(path, "failed to set input fact", e))?
        .into_optimized()
        .map_err(|e| load_error(path, "failed to optimize ONNX model", e))?
        .into_runnable()
        .map_err(|e| load_error(path, "failed to build runnable ONNX model", e))
}

fn output_len(model: &RunnableModel, path: &Path) -> Result<usize, PipelineError> {
    let fact = model
        .model()
        .output_fact(0)
        .map_err(|e| PipelineError::model_load(path, e))?;
    let shape = fact
        .shape
        .as_concrete()
        .ok_or_else(|| PipelineError::model_load(path, "model output shape is not concrete"))?;
    Ok(shape.iter().product())
}

fn run_flat(model: &RunnableModel, input: Tensor) -> Result<Vec<f32>, PipelineError> {
    let outputs = model
        .run(tvec!(input.into()))
        .map_err(|e| PipelineError::Inference(format!("ONNX inference failed: {}", e)))?;
    let output = outputs
        .first()
        .ok_or_else(|| PipelineError::Inference("model produced no outputs".to_string()))?;
    let values = output
        .to_array_view::<f32>()
        .map_err(|e| PipelineError::Inference(format!("model output tensor was not f32: {}", e)))?;
    Ok(values.iter().copied().collect())
}

/// ONNX clip feature extractor (C3D-style, input `[1, 3, T, H, W]`).
pub struct TractExtractor {
    model: RunnableModel,
    input_shape: [usize; 5],
    embedding_dim: usize,
    mode: ExecutionMode,
}

impl TractExtractor {
    pub fn load<P: AsRef<Path>>(
        path: P,
        input_shape: [usize; 5],
        mode: ExecutionMode,
    ) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let model = load_runnable(path, &input_shape)?;
        let embedding_dim = output_len(&model, path)?;
        log::info!(
            "loaded extractor {} (input {:?}, embedding {})",
            path.display(),
            input_shape,
            embedding_dim
        );
        Ok(Self {
            model,
            input_shape,
            embedding_dim,
            mode,
        })
    }
}

impl FeatureExtractor for TractExtractor {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn execution_mode(&self) -> ExecutionMode {
        self.mode
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn extract(&self, clip: &ClipTensor) -> Result<FeatureEmbedding, PipelineError> {
        if clip.shape() != self.input_shape {
            return Err(PipelineError::Inference(format!(
                "clip shape {:?} does not match model input {:?}",
                clip.shape(),
                self.input_shape
            )));
        }
        let input = Tensor::from_shape(&self.input_shape, clip.as_slice())
            .map_err(|e| PipelineError::Inference(format!("build input tensor: {}", e)))?;
        run_flat(&self.model, input).map(FeatureEmbedding::new)
    }
}

/// ONNX binary head with input `[1, D]`.
///
/// A single output is read as a sigmoid probability; two outputs are treated as
/// logits and softmaxed.
pub struct TractClassifier {
    model: RunnableModel,
    input_dim: usize,
    head: BinaryHead,
    mode: ExecutionMode,
}

impl TractClassifier {
    pub fn load<P: AsRef<Path>>(
        path: P,
        input_dim: usize,
        head: BinaryHead,
        mode: ExecutionMode,
    ) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let model = load_runnable(path, &[1, input_dim])?;
        let outputs = output_len(&model, path)?;
        if outputs != 1 && outputs != 2 {
            return Err(PipelineError::model_load(
                path,
                format!("binary head must produce 1 or 2 values, produces {}", outputs),
            ));
        }
        Ok(Self {
            model,
            input_dim,
            head,
            mode,
        })
    }
}

impl Classifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn execution_mode(&self) -> ExecutionMode {
        self.mode
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn head(&self) -> &BinaryHead {
        &self.head
    }

    fn score(&self, embedding: &FeatureEmbedding) -> Result<f32, PipelineError> {
        let input = Tensor::from_shape(&[1, self.input_dim], embedding.as_slice())
            .map_err(|e| PipelineError::Inference(format!("build input tensor: {}", e)))?;
        match run_flat(&self.model, input)?.as_slice() {
            [p] => Ok(*p),
            [a, b] => {
                let m = a.max(*b);
                let (ea, eb) = ((a - m).exp(), (b - m).exp());
                Ok(eb / (ea + eb))
            }
            other => Err(PipelineError::Inference(format!(
                "binary head produced {} values",
                other.len()
            ))),
        }
    }
}
