use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::infer::{BackendKind, Preprocessor, DEFAULT_INPUT_SIZE, SPORTS1M_MEAN};
use crate::sink::Container;
use crate::{DEFAULT_OUTPUT_FPS, DEFAULT_OUTPUT_HEIGHT, DEFAULT_OUTPUT_WIDTH, DEFAULT_WINDOW_SIZE};

const DEFAULT_INPUT_DIR: &str = "data/videos";
const DEFAULT_OUTPUT_DIR: &str = ".";
const DEFAULT_OUTPUT_SUFFIX: &str = "c3d";
const DEFAULT_EXTRACTOR_PATH: &str = "checkpoints/c3d_extractor.json";
const DEFAULT_CLASSIFIER_PATH: &str = "checkpoints/c3d_classifier.json";
const DEFAULT_LABELS: [&str; 2] = ["no_action", "action"];
const DEFAULT_THRESHOLD: f32 = 0.5;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CLIP_ANNOTATOR_CONFIG";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AnnotateConfigFile {
    input_dir: Option<PathBuf>,
    log_mode: Option<bool>,
    window_size: Option<usize>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    output: Option<OutputConfigFile>,
    model: Option<ModelConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    suffix: Option<String>,
    container: Option<Container>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    backend: Option<BackendKind>,
    extractor_path: Option<PathBuf>,
    classifier_path: Option<PathBuf>,
    labels: Option<[String; 2]>,
    threshold: Option<f32>,
    mean: Option<[f32; 3]>,
    scale: Option<[f32; 3]>,
}

/// Settings for one annotation run.
#[derive(Debug, Clone)]
pub struct AnnotateConfig {
    pub input_dir: PathBuf,
    /// `true` prints one line per frame, `false` writes annotated videos.
    pub log_mode: bool,
    pub window_size: usize,
    pub input_width: u32,
    pub input_height: u32,
    pub output: OutputSettings,
    pub model: ModelSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub suffix: String,
    pub container: Container,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub backend: BackendKind,
    pub extractor_path: PathBuf,
    pub classifier_path: PathBuf,
    /// Negative class first, positive class second.
    pub labels: [String; 2],
    pub threshold: f32,
    pub mean: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            width: DEFAULT_OUTPUT_WIDTH,
            height: DEFAULT_OUTPUT_HEIGHT,
            fps: DEFAULT_OUTPUT_FPS,
            suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            container: Container::default(),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            extractor_path: PathBuf::from(DEFAULT_EXTRACTOR_PATH),
            classifier_path: PathBuf::from(DEFAULT_CLASSIFIER_PATH),
            labels: DEFAULT_LABELS.map(str::to_string),
            threshold: DEFAULT_THRESHOLD,
            mean: SPORTS1M_MEAN,
            scale: [1.0; 3],
        }
    }
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            log_mode: true,
            window_size: DEFAULT_WINDOW_SIZE,
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            output: OutputSettings::default(),
            model: ModelSettings::default(),
        }
    }
}

impl AnnotateConfig {
    /// Defaults, then the file named by `CLIP_ANNOTATOR_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self, PipelineError> {
        let config_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, with an explicit config file taking the place of `CLIP_ANNOTATOR_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self, PipelineError> {
        Self::load_with(path, |_| Ok(()))
    }

    /// Defaults, file, environment, then `overrides` (command line).
    ///
    /// Validation runs once, after the last layer.
    pub fn load_with<F>(path: Option<&Path>, overrides: F) -> Result<Self, PipelineError>
    where
        F: FnOnce(&mut Self) -> Result<(), PipelineError>,
    {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => AnnotateConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        overrides(&mut cfg)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AnnotateConfigFile) -> Self {
        let defaults = Self::default();
        let output = file.output.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        Self {
            input_dir: file.input_dir.unwrap_or(defaults.input_dir),
            log_mode: file.log_mode.unwrap_or(defaults.log_mode),
            window_size: file.window_size.unwrap_or(defaults.window_size),
            input_width: file.input_width.unwrap_or(defaults.input_width),
            input_height: file.input_height.unwrap_or(defaults.input_height),
            output: OutputSettings {
                dir: output.dir.unwrap_or(defaults.output.dir),
                width: output.width.unwrap_or(defaults.output.width),
                height: output.height.unwrap_or(defaults.output.height),
                fps: output.fps.unwrap_or(defaults.output.fps),
                suffix: output.suffix.unwrap_or(defaults.output.suffix),
                container: output.container.unwrap_or(defaults.output.container),
            },
            model: ModelSettings {
                backend: model.backend.unwrap_or(defaults.model.backend),
                extractor_path: model
                    .extractor_path
                    .unwrap_or(defaults.model.extractor_path),
                classifier_path: model
                    .classifier_path
                    .unwrap_or(defaults.model.classifier_path),
                labels: model.labels.unwrap_or(defaults.model.labels),
                threshold: model.threshold.unwrap_or(defaults.model.threshold),
                mean: model.mean.unwrap_or(defaults.model.mean),
                scale: model.scale.unwrap_or(defaults.model.scale),
            },
        }
    }

    fn apply_env(&mut self) -> Result<(), PipelineError> {
        if let Some(mode) = env_value("CLIP_ANNOTATOR_LOG_MODE") {
            self.log_mode = parse_bool(&mode).ok_or_else(|| {
                PipelineError::Config("CLIP_ANNOTATOR_LOG_MODE must be true or false".to_string())
            })?;
        }
        if let Some(dir) = env_value("CLIP_ANNOTATOR_INPUT_DIR") {
            self.input_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_value("CLIP_ANNOTATOR_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
        if let Some(size) = env_value("CLIP_ANNOTATOR_WINDOW_SIZE") {
            self.window_size = size.parse().map_err(|_| {
                PipelineError::Config(
                    "CLIP_ANNOTATOR_WINDOW_SIZE must be a whole number of frames".to_string(),
                )
            })?;
        }
        if let Some(backend) = env_value("CLIP_ANNOTATOR_BACKEND") {
            self.model.backend = backend.parse()?;
        }
        if let Some(path) = env_value("CLIP_ANNOTATOR_EXTRACTOR") {
            self.model.extractor_path = PathBuf::from(path);
        }
        if let Some(path) = env_value("CLIP_ANNOTATOR_CLASSIFIER") {
            self.model.classifier_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Check ranges and invariants.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid =
            |msg: &str| -> Result<(), PipelineError> { Err(PipelineError::Config(msg.to_string())) };
        if self.window_size == 0 {
            return invalid("window_size must be at least 1 frame");
        }
        if self.input_width == 0 || self.input_height == 0 {
            return invalid("input resolution must be non-zero");
        }
        if self.output.width == 0 || self.output.height == 0 {
            return invalid("output resolution must be non-zero");
        }
        if self.output.fps == 0 {
            return invalid("output fps must be >= 1");
        }
        if self.output.suffix.trim().is_empty() {
            return invalid("output suffix must not be empty");
        }
        if !self.log_mode && !self.output.container.is_available() {
            return invalid("mp4 output requires the ffmpeg feature; use container = \"y4m\"");
        }
        if !(0.0..=1.0).contains(&self.model.threshold) {
            return invalid("threshold must be within [0, 1]");
        }
        let [negative, positive] = &self.model.labels;
        if negative.trim().is_empty() || positive.trim().is_empty() {
            return invalid("class labels must not be empty");
        }
        if negative == positive {
            return invalid("class labels must be distinct");
        }
        if self.model.scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return invalid("normalization scale must be finite and non-zero");
        }
        Ok(())
    }

    /// Shape of the tensor the preprocessor produces for one window.
    pub fn clip_shape(&self) -> [usize; 5] {
        [
            1,
            3,
            self.window_size,
            self.input_height as usize,
            self.input_width as usize,
        ]
    }

    pub fn preprocessor(&self) -> Preprocessor {
        Preprocessor::new(
            self.input_width,
            self.input_height,
            self.model.mean,
            self.model.scale,
        )
    }
}

fn read_config_file(path: &Path) -> Result<AnnotateConfigFile, PipelineError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let parsed = if is_toml {
        toml::from_str(&raw).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&raw).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| {
        PipelineError::Config(format!("invalid config file {}: {}", path.display(), e))
    })
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
