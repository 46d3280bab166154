use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for the annotation pipeline.
///
/// Per-file failures (`SourceUnavailable`, `SourceRead`, `Inference`, `SinkWrite`)
/// end the current video only. `ModelLoad` and `Config` abort the whole run.
/// `InvalidFrameShape` aborts only the window that contains the frame.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source unavailable: {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("source read failed: {path}: {reason}")]
    SourceRead { path: PathBuf, reason: String },

    #[error("model load failed: {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("invalid frame shape at frame {frame_id} ({width}x{height}): {reason}")]
    InvalidFrameShape {
        frame_id: u64,
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("sink write failed: {path}: {reason}")]
    SinkWrite { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Returns true when the error must abort the whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ModelLoad { .. } | Self::Config(_))
    }

    pub(crate) fn model_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn sink_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SinkWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn source_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_load_and_config_errors_are_fatal() {
        assert!(PipelineError::model_load("x.json", "missing").is_fatal());
        assert!(PipelineError::Config("bad".into()).is_fatal());
        assert!(!PipelineError::source_unavailable("a.mp4", "nope").is_fatal());
        assert!(!PipelineError::sink_write("a-c3d.mp4", "disk full").is_fatal());
        assert!(!PipelineError::Inference("nan".into()).is_fatal());
        let shape = PipelineError::InvalidFrameShape {
            frame_id: 3,
            width: 0,
            height: 0,
            reason: "empty raster".into(),
        };
        assert!(!shape.is_fatal());
        assert!(shape.to_string().contains("frame 3"));
    }
}
