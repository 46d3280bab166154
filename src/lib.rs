//! Clip Annotator
//!
//! Offline batch annotation of video footage with a two-class action
//! classifier.
//!
//! # Architecture
//!
//! Every video is streamed through the same synchronous pipeline:
//!
//! 1. **Ingest**: a `FileSource` decodes frames one at a time, numbering them from 1.
//! 2. **Buffer**: a `ClipBuffer` collects frames into fixed, non-overlapping windows.
//! 3. **Infer**: each full window is preprocessed into a clip tensor, embedded by a
//!    frozen `FeatureExtractor`, and labelled by a frozen `Classifier`.
//! 4. **Annotate**: the window's single prediction is burned into every frame of it.
//! 5. **Sink**: annotated frames go either to a line log or to a re-encoded video.
//!
//! Trailing frames that never fill a window are dropped.
//!
//! # Module Structure
//!
//! - `frame`: Frame, ClipWindow, ClipBuffer
//! - `ingest`: frame sources (ffmpeg-decoded files, synthetic clip descriptors)
//! - `infer`: preprocessing plus extractor/classifier backends
//! - `annotate`: caption rendering
//! - `sink`: log and video outputs
//! - `pipeline`: per-video state machine and batch driver

pub mod annotate;
pub mod config;
pub mod error;
pub mod frame;
pub mod infer;
pub mod ingest;
pub mod pipeline;
pub mod sink;
pub mod ui;

pub use annotate::{annotate, caption_for, AnnotatedFrame};
pub use config::{AnnotateConfig, ModelSettings, OutputSettings};
pub use error::PipelineError;
pub use frame::{ClipBuffer, ClipWindow, Frame};
pub use infer::{
    BackendKind, Classifier, ClipTensor, ExecutionMode, FeatureEmbedding, FeatureExtractor,
    Models, Prediction, Preprocessor,
};
pub use ingest::{FileSource, SourceStats};
pub use pipeline::{
    list_videos, run_batch, BatchReport, CancelToken, Pipeline, RunOutcome, VideoReport,
};
pub use sink::{Container, LogSink, OutputSink, VideoSink};

/// Default number of frames per clip window.
pub const DEFAULT_WINDOW_SIZE: usize = 60;

/// Default VideoSink raster and rate.
pub const DEFAULT_OUTPUT_WIDTH: u32 = 1920;
pub const DEFAULT_OUTPUT_HEIGHT: u32 = 1080;
pub const DEFAULT_OUTPUT_FPS: u32 = 30;

/// Result alias for library operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
