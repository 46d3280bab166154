use serde::Serialize;

use crate::error::PipelineError;

/// Preprocessed clip, logical shape `[1, channels, frames, height, width]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipTensor {
    shape: [usize; 5],
    data: Vec<f32>,
}

impl ClipTensor {
    pub(crate) fn new(shape: [usize; 5], data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    pub fn shape(&self) -> [usize; 5] {
        self.shape
    }

    pub fn channels(&self) -> usize {
        self.shape[1]
    }

    pub fn frames(&self) -> usize {
        self.shape[2]
    }

    pub fn height(&self) -> usize {
        self.shape[3]
    }

    pub fn width(&self) -> usize {
        self.shape[4]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Value at channel `c`, frame `t`, row `y`, column `x`.
    pub fn at(&self, c: usize, t: usize, y: usize, x: usize) -> f32 {
        let [_, _, frames, height, width] = self.shape;
        self.data[((c * frames + t) * height + y) * width + x]
    }
}

/// Fixed-dimension clip embedding produced by a feature extractor.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureEmbedding(Vec<f32>);

impl FeatureEmbedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Label and confidence assigned to one clip window.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    /// Probability of `label`, always within `[0, 1]`.
    pub confidence: f32,
}

/// Turns a positive-class probability into a `Prediction`.
#[derive(Clone, Debug, PartialEq)]
pub struct BinaryHead {
    labels: [String; 2],
    threshold: f32,
}

impl BinaryHead {
    /// `labels[0]` is the negative class, `labels[1]` the positive one.
    pub fn new(labels: [String; 2], threshold: f32) -> Self {
        Self { labels, threshold }
    }

    pub fn labels(&self) -> &[String; 2] {
        &self.labels
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn decide(&self, positive: f32) -> Result<Prediction, PipelineError> {
        if !positive.is_finite() {
            return Err(PipelineError::Inference(format!(
                "classifier produced non-finite score {}",
                positive
            )));
        }
        let p = positive.clamp(0.0, 1.0);
        let (label, confidence) = if p >= self.threshold {
            (&self.labels[1], p)
        } else {
            (&self.labels[0], 1.0 - p)
        };
        Ok(Prediction {
            label: label.clone(),
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head() -> BinaryHead {
        BinaryHead::new(["no_action".into(), "action".into()], 0.5)
    }

    #[test]
    fn head_picks_label_and_confidence() {
        let p = head().decide(0.8).unwrap();
        assert_eq!(p.label, "action");
        assert!((p.confidence - 0.8).abs() < 1e-6);

        let n = head().decide(0.25).unwrap();
        assert_eq!(n.label, "no_action");
        assert!((n.confidence - 0.75).abs() < 1e-6);

        assert_eq!(head().decide(0.5).unwrap().label, "action");
    }

    #[test]
    fn head_clamps_and_rejects_nan() {
        assert_eq!(head().decide(1.7).unwrap().confidence, 1.0);
        assert_eq!(head().decide(-3.0).unwrap().confidence, 1.0);
        assert!(matches!(
            head().decide(f32::NAN),
            Err(PipelineError::Inference(_))
        ));
    }

    #[test]
    fn tensor_indexing_is_channel_major() {
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let tensor = ClipTensor::new([1, 3, 2, 2, 1], data);
        assert_eq!(tensor.at(0, 0, 0, 0), 0.0);
        assert_eq!(tensor.at(0, 1, 0, 0), 2.0);
        assert_eq!(tensor.at(1, 0, 1, 0), 5.0);
        assert_eq!(tensor.at(2, 1, 1, 0), 11.0);
    }
}
