//! Clip inference: preprocessing plus frozen extractor/classifier backends.
//!
//! Both networks are loaded once, before any video is read, and are shared by
//! reference for the rest of the run. A load failure aborts the run.

mod backend;
pub mod backends;
mod preprocess;
mod result;

use crate::config::ModelSettings;
use crate::error::PipelineError;

pub use backend::{BackendKind, Classifier, ExecutionMode, FeatureExtractor};
pub use preprocess::{Preprocessor, DEFAULT_INPUT_SIZE, SPORTS1M_MEAN};
pub use result::{BinaryHead, ClipTensor, FeatureEmbedding, Prediction};

/// The frozen extractor and classifier for one run.
pub struct Models {
    extractor: Box<dyn FeatureExtractor>,
    classifier: Box<dyn Classifier>,
}

impl Models {
    /// Pair an extractor with a classifier, checking the embedding sizes agree.
    pub fn new(
        extractor: Box<dyn FeatureExtractor>,
        classifier: Box<dyn Classifier>,
    ) -> Result<Self, PipelineError> {
        if extractor.embedding_dim() != classifier.input_dim() {
            return Err(PipelineError::model_load(
                classifier.name(),
                format!(
                    "extractor '{}' yields {} features, classifier '{}' expects {}",
                    extractor.name(),
                    extractor.embedding_dim(),
                    classifier.name(),
                    classifier.input_dim()
                ),
            ));
        }
        Ok(Self {
            extractor,
            classifier,
        })
    }

    /// Load both checkpoints named by `settings`.
    ///
    /// `clip_shape` is the `[1, 3, T, H, W]` tensor shape the preprocessor emits.
    pub fn load(settings: &ModelSettings, clip_shape: [usize; 5]) -> Result<Self, PipelineError> {
        let mode = ExecutionMode::InferenceOnly;
        let head = BinaryHead::new(settings.labels.clone(), settings.threshold);
        let models = match settings.backend {
            BackendKind::Native => {
                let extractor = backends::PooledExtractor::load(&settings.extractor_path, mode)?;
                extractor
                    .check_input(clip_shape)
                    .map_err(|reason| PipelineError::model_load(&settings.extractor_path, reason))?;
                let classifier =
                    backends::LinearClassifier::load(&settings.classifier_path, head, mode)?;
                Self::new(Box::new(extractor), Box::new(classifier))?
            }
            BackendKind::Tract => load_tract(settings, clip_shape, head, mode)?,
        };
        log::info!(
            "models ready: extractor={} classifier={} embedding_dim={} mode={:?}",
            models.extractor.name(),
            models.classifier.name(),
            models.extractor.embedding_dim(),
            models.extractor.execution_mode()
        );
        Ok(models)
    }

    pub fn extractor(&self) -> &dyn FeatureExtractor {
        self.extractor.as_ref()
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    /// Embed and classify one preprocessed clip.
    pub fn predict(&self, clip: &ClipTensor) -> Result<Prediction, PipelineError> {
        let embedding = self.extractor.extract(clip)?;
        self.classifier.classify(&embedding)
    }
}

#[cfg(feature = "backend-tract")]
fn load_tract(
    settings: &ModelSettings,
    clip_shape: [usize; 5],
    head: BinaryHead,
    mode: ExecutionMode,
) -> Result<Models, PipelineError> {
    let extractor = backends::TractExtractor::load(&settings.extractor_path, clip_shape, mode)?;
    let classifier = backends::TractClassifier::load(
        &settings.classifier_path,
        extractor.embedding_dim(),
        head,
        mode,
    )?;
    Models::new(Box::new(extractor), Box::new(classifier))
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(
    settings: &ModelSettings,
    _clip_shape: [usize; 5],
    _head: BinaryHead,
    _mode: ExecutionMode,
) -> Result<Models, PipelineError> {
    Err(PipelineError::model_load(
        &settings.extractor_path,
        "the tract backend requires the backend-tract feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelSettings;

    fn write(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn settings(dir: &std::path::Path, classifier_body: &str) -> ModelSettings {
        ModelSettings {
            extractor_path: write(dir, "extractor.json", r#"{"grid": 1}"#),
            classifier_path: write(dir, "classifier.json", classifier_body),
            ..ModelSettings::default()
        }
    }

    #[test]
    fn native_models_load_and_predict() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = settings(dir.path(), r#"{"weights": [0, 0, 0, 0], "bias": 2.0}"#);
        let models = Models::load(&cfg, [1, 3, 2, 4, 4]).unwrap();
        let clip = ClipTensor::new([1, 3, 2, 4, 4], vec![0.0; 96]);
        let prediction = models.predict(&clip).unwrap();
        assert_eq!(prediction.label, cfg.labels[1]);
        assert!((0.0..=1.0).contains(&prediction.confidence));
    }

    #[test]
    fn dimension_mismatch_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = settings(dir.path(), r#"{"weights": [1, 2, 3], "bias": 0.0}"#);
        assert!(matches!(
            Models::load(&cfg, [1, 3, 2, 4, 4]),
            Err(PipelineError::ModelLoad { .. })
        ));
    }

    #[test]
    fn grid_larger_than_input_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let weights = vec!["0.0"; 4 * 16 * 16].join(", ");
        let cfg = ModelSettings {
            extractor_path: write(dir.path(), "extractor.json", r#"{"grid": 16}"#),
            classifier_path: write(
                dir.path(),
                "classifier.json",
                &format!(r#"{{"weights": [{}], "bias": 0.0}}"#, weights),
            ),
            ..ModelSettings::default()
        };
        match Models::load(&cfg, [1, 3, 4, 8, 8]) {
            Err(PipelineError::ModelLoad { path, .. }) => assert_eq!(path, cfg.extractor_path),
            Err(other) => panic!("expected model load error, got {:?}", other),
            Ok(_) => panic!("grid 16 must not load for 8x8 clips"),
        }
        assert!(Models::load(&cfg, [1, 3, 4, 16, 16]).is_ok());
    }

    #[test]
    fn backends_report_inference_only() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = settings(dir.path(), r#"{"weights": [0, 0, 0, 0], "bias": 0.0}"#);
        let models = Models::load(&cfg, [1, 3, 2, 4, 4]).unwrap();
        assert_eq!(models.extractor().execution_mode(), ExecutionMode::InferenceOnly);
        assert_eq!(models.classifier().execution_mode(), ExecutionMode::InferenceOnly);
    }

    #[test]
    fn missing_checkpoint_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ModelSettings {
            extractor_path: dir.path().join("missing.json"),
            classifier_path: dir.path().join("missing-too.json"),
            ..ModelSettings::default()
        };
        let err = Models::load(&cfg, [1, 3, 60, 112, 112]).err().unwrap();
        assert!(err.is_fatal());
    }
}
