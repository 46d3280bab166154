use std::path::Path;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::infer::backend::{Classifier, ExecutionMode, FeatureExtractor};
use crate::infer::result::{BinaryHead, ClipTensor, FeatureEmbedding};

const MAX_GRID: usize = 32;

#[derive(Deserialize)]
struct PooledCheckpoint {
    grid: usize,
}

#[derive(Deserialize)]
struct LinearCheckpoint {
    weights: Vec<f32>,
    bias: f32,
}

fn read_checkpoint<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, PipelineError> {
    let raw = std::fs::read_to_string(path).map_err(|e| PipelineError::model_load(path, e))?;
    serde_json::from_str(&raw)
        .map_err(|e| PipelineError::model_load(path, format!("invalid checkpoint: {}", e)))
}

/// Spatio-temporal pooling extractor.
///
/// Splits each frame into a `grid x grid` layout. For every cell it reports the
/// mean of each channel over the whole clip, followed by the cell's mean
/// absolute frame-to-frame change. Embedding length is `4 * grid * grid`.
pub struct PooledExtractor {
    grid: usize,
    mode: ExecutionMode,
}

impl PooledExtractor {
    pub fn new(grid: usize, mode: ExecutionMode) -> Result<Self, PipelineError> {
        if grid == 0 || grid > MAX_GRID {
            return Err(PipelineError::model_load(
                "<inline>",
                format!("grid must be within 1..={}, got {}", MAX_GRID, grid),
            ));
        }
        Ok(Self { grid, mode })
    }

    pub fn load<P: AsRef<Path>>(path: P, mode: ExecutionMode) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let checkpoint: PooledCheckpoint = read_checkpoint(path)?;
        Self::new(checkpoint.grid, mode).map_err(|e| PipelineError::model_load(path, e))
    }

    /// Check the extractor can pool clips of `shape` (`[1, 3, T, H, W]`).
    pub fn check_input(&self, shape: [usize; 5]) -> Result<(), String> {
        let [_, channels, frames, height, width] = shape;
        if channels != 3 || frames == 0 {
            return Err(format!(
                "expects [1, 3, T, H, W] clips with T > 0, configured {:?}",
                shape
            ));
        }
        if height < self.grid || width < self.grid {
            return Err(format!(
                "{}x{} pooling grid does not fit {}x{} clips",
                self.grid, self.grid, width, height
            ));
        }
        Ok(())
    }

    fn cell_bounds(&self, index: usize, extent: usize) -> (usize, usize) {
        (index * extent / self.grid, (index + 1) * extent / self.grid)
    }
}

impl FeatureExtractor for PooledExtractor {
    fn name(&self) -> &'static str {
        "pooled"
    }

    fn execution_mode(&self) -> ExecutionMode {
        self.mode
    }

    fn embedding_dim(&self) -> usize {
        4 * self.grid * self.grid
    }

    fn extract(&self, clip: &ClipTensor) -> Result<FeatureEmbedding, PipelineError> {
        let (frames, height, width) = (clip.frames(), clip.height(), clip.width());
        if clip.channels() != 3 || frames == 0 {
            return Err(PipelineError::Inference(format!(
                "pooled extractor expects [1, 3, T, H, W] with T > 0, got {:?}",
                clip.shape()
            )));
        }
        if height < self.grid || width < self.grid {
            return Err(PipelineError::Inference(format!(
                "clip raster {}x{} is smaller than the {}x{} pooling grid",
                width, height, self.grid, self.grid
            )));
        }

        let cells = self.grid * self.grid;
        let mut means = vec![0f32; 3 * cells];
        let mut motion = vec![0f32; cells];

        for gy in 0..self.grid {
            let (y0, y1) = self.cell_bounds(gy, height);
            for gx in 0..self.grid {
                let (x0, x1) = self.cell_bounds(gx, width);
                let cell = gy * self.grid + gx;
                let area = ((y1 - y0) * (x1 - x0)) as f32;

                let mut previous: Option<f32> = None;
                let mut change = 0f32;
                for t in 0..frames {
                    let mut frame_sum = [0f32; 3];
                    for y in y0..y1 {
                        for x in x0..x1 {
                            for (c, sum) in frame_sum.iter_mut().enumerate() {
                                *sum += clip.at(c, t, y, x);
                            }
                        }
                    }
                    for c in 0..3 {
                        means[c * cells + cell] += frame_sum[c] / area;
                    }
                    let intensity = frame_sum.iter().sum::<f32>() / (3.0 * area);
                    if let Some(prev) = previous {
                        change += (intensity - prev).abs();
                    }
                    previous = Some(intensity);
                }

                for c in 0..3 {
                    means[c * cells + cell] /= frames as f32;
                }
                if frames > 1 {
                    motion[cell] = change / (frames - 1) as f32;
                }
            }
        }

        means.extend(motion);
        Ok(FeatureEmbedding::new(means))
    }
}

/// Logistic-regression binary head: `sigmoid(w . x + b)`.
pub struct LinearClassifier {
    weights: Vec<f32>,
    bias: f32,
    head: BinaryHead,
    mode: ExecutionMode,
}

impl LinearClassifier {
    pub fn new(
        weights: Vec<f32>,
        bias: f32,
        head: BinaryHead,
        mode: ExecutionMode,
    ) -> Result<Self, PipelineError> {
        if weights.is_empty() {
            return Err(PipelineError::model_load("<inline>", "classifier has no weights"));
        }
        if !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(PipelineError::model_load(
                "<inline>",
                "classifier weights must be finite",
            ));
        }
        Ok(Self {
            weights,
            bias,
            head,
            mode,
        })
    }

    pub fn load<P: AsRef<Path>>(
        path: P,
        head: BinaryHead,
        mode: ExecutionMode,
    ) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let checkpoint: LinearCheckpoint = read_checkpoint(path)?;
        Self::new(checkpoint.weights, checkpoint.bias, head, mode)
            .map_err(|e| PipelineError::model_load(path, e))
    }
}

impl Classifier for LinearClassifier {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn execution_mode(&self) -> ExecutionMode {
        self.mode
    }

    fn input_dim(&self) -> usize {
        self.weights.len()
    }

    fn head(&self) -> &BinaryHead {
        &self.head
    }

    fn score(&self, embedding: &FeatureEmbedding) -> Result<f32, PipelineError> {
        let logit = self
            .weights
            .iter()
            .zip(embedding.as_slice())
            .map(|(w, x)| w * x)
            .sum::<f32>()
            + self.bias;
        Ok(sigmoid(logit))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head() -> BinaryHead {
        BinaryHead::new(["walk".into(), "run".into()], 0.5)
    }

    fn clip(frames: usize, value_at: impl Fn(usize, usize, usize, usize) -> f32) -> ClipTensor {
        let (h, w) = (4, 4);
        let mut data = Vec::with_capacity(3 * frames * h * w);
        for c in 0..3 {
            for t in 0..frames {
                for y in 0..h {
                    for x in 0..w {
                        data.push(value_at(c, t, y, x));
                    }
                }
            }
        }
        ClipTensor::new([1, 3, frames, h, w], data)
    }

    #[test]
    fn pooled_embedding_layout() {
        let extractor = PooledExtractor::new(2, ExecutionMode::InferenceOnly).unwrap();
        assert_eq!(extractor.embedding_dim(), 16);

        // Channel c holds c + 1 everywhere; the top-left cell flips 0/4 each frame.
        let tensor = clip(3, |c, t, y, x| {
            if y < 2 && x < 2 {
                if t % 2 == 0 {
                    0.0
                } else {
                    4.0
                }
            } else {
                (c + 1) as f32
            }
        });
        let embedding = extractor.extract(&tensor).unwrap();
        let v = embedding.as_slice();
        assert_eq!(v.len(), 16);
        // channel means for cell 1 (top-right)
        assert_eq!(v[1], 1.0);
        assert_eq!(v[4 + 1], 2.0);
        assert_eq!(v[8 + 1], 3.0);
        // motion: top-left changes by 4 every step, others are static
        assert_eq!(v[12], 4.0);
        assert_eq!(&v[13..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn pooled_rejects_tiny_raster() {
        let extractor = PooledExtractor::new(8, ExecutionMode::InferenceOnly).unwrap();
        assert!(matches!(
            extractor.extract(&clip(1, |_, _, _, _| 0.0)),
            Err(PipelineError::Inference(_))
        ));
    }

    #[test]
    fn input_check_matches_grid() {
        let extractor = PooledExtractor::new(8, ExecutionMode::InferenceOnly).unwrap();
        assert!(extractor.check_input([1, 3, 4, 8, 8]).is_ok());
        assert!(extractor.check_input([1, 3, 4, 4, 112]).is_err());
        assert!(extractor.check_input([1, 3, 0, 112, 112]).is_err());
    }

    #[test]
    fn linear_head_scores_with_sigmoid() {
        let classifier =
            LinearClassifier::new(vec![1.0, -1.0], 0.0, head(), ExecutionMode::InferenceOnly)
                .unwrap();
        let even = classifier
            .classify(&FeatureEmbedding::new(vec![2.0, 2.0]))
            .unwrap();
        assert_eq!(even.label, "run");
        assert!((even.confidence - 0.5).abs() < 1e-6);

        let negative = classifier
            .classify(&FeatureEmbedding::new(vec![0.0, 10.0]))
            .unwrap();
        assert_eq!(negative.label, "walk");
        assert!(negative.confidence > 0.99 && negative.confidence <= 1.0);
    }

    #[test]
    fn linear_head_rejects_wrong_dimension() {
        let classifier =
            LinearClassifier::new(vec![1.0; 4], 0.0, head(), ExecutionMode::InferenceOnly).unwrap();
        assert!(classifier
            .classify(&FeatureEmbedding::new(vec![1.0; 3]))
            .is_err());
    }

    #[test]
    fn checkpoints_load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let extractor_path = dir.path().join("extractor.json");
        let classifier_path = dir.path().join("classifier.json");
        std::fs::write(&extractor_path, r#"{"grid": 3}"#).unwrap();
        std::fs::write(&classifier_path, r#"{"weights": [0.5, 0.5], "bias": -1.0}"#).unwrap();

        let extractor =
            PooledExtractor::load(&extractor_path, ExecutionMode::InferenceOnly).unwrap();
        assert_eq!(extractor.embedding_dim(), 36);
        let classifier =
            LinearClassifier::load(&classifier_path, head(), ExecutionMode::InferenceOnly)
                .unwrap();
        assert_eq!(classifier.input_dim(), 2);

        let missing = PooledExtractor::load(dir.path().join("nope.json"), ExecutionMode::InferenceOnly);
        assert!(matches!(missing, Err(PipelineError::ModelLoad { .. })));
    }
}
