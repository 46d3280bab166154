//! Per-video orchestration and the batch driver.
//!
//! Each video runs through a small state machine:
//!
//! ```text
//! Idle -> Streaming <-> Inferring
//!             |             |
//!             +-> Draining <+-> Closed
//! ```
//!
//! A video never affects the next one: its source, sink session and clip buffer
//! are dropped before the batch moves on. Only a fatal error (model load,
//! configuration) stops a batch, and those happen before the first video.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::annotate::annotate;
use crate::config::AnnotateConfig;
use crate::error::PipelineError;
use crate::frame::{ClipBuffer, ClipWindow};
use crate::infer::{Models, Preprocessor};
use crate::ingest::FileSource;
use crate::sink::{OutputSink, SinkSession};
use crate::ui::{StageGuard, Ui};

/// Cooperative cancellation flag, checked between frame reads.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StreamState {
    Idle,
    Streaming,
    Inferring,
    Draining,
    Closed,
}

impl StreamState {
    fn can_move_to(self, next: StreamState) -> bool {
        use StreamState::*;
        matches!(
            (self, next),
            (Idle, Streaming)
                | (Idle, Closed)
                | (Streaming, Inferring)
                | (Streaming, Draining)
                | (Inferring, Streaming)
                | (Inferring, Draining)
                | (Draining, Closed)
        )
    }
}

struct StateMachine {
    state: StreamState,
    video: String,
}

impl StateMachine {
    fn new(path: &Path) -> Self {
        Self {
            state: StreamState::Idle,
            video: path.display().to_string(),
        }
    }

    fn advance(&mut self, next: StreamState) {
        debug_assert!(
            self.state.can_move_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        // per-window churn stays out of the log
        let per_window = matches!(
            (self.state, next),
            (StreamState::Streaming, StreamState::Inferring)
                | (StreamState::Inferring, StreamState::Streaming)
        );
        if !per_window {
            log::debug!("{}: {:?} -> {:?}", self.video, self.state, next);
        }
        self.state = next;
    }
}

/// How a video run ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Counters for one video.
#[derive(Clone, Debug, Serialize)]
pub struct VideoReport {
    pub path: PathBuf,
    pub frames_read: u64,
    /// Windows that were classified and written.
    pub windows: u64,
    /// Windows dropped because a frame had an unusable raster.
    pub windows_aborted: u64,
    pub frames_emitted: u64,
    /// Tail frames that never filled a window.
    pub frames_dropped: u64,
    pub output: Option<PathBuf>,
    pub outcome: RunOutcome,
}

impl VideoReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            frames_read: 0,
            windows: 0,
            windows_aborted: 0,
            frames_emitted: 0,
            frames_dropped: 0,
            output: None,
            outcome: RunOutcome::Completed,
        }
    }

    fn fail(&mut self, err: &PipelineError) {
        log::warn!("{}: {}", self.path.display(), err);
        self.outcome = RunOutcome::Failed(err.to_string());
    }

    fn summary(&self) -> String {
        match &self.outcome {
            RunOutcome::Completed => format!(
                "{} frames, {} windows",
                self.frames_emitted, self.windows
            ),
            RunOutcome::Cancelled => format!("cancelled after {} frames", self.frames_read),
            RunOutcome::Failed(_) => "failed".to_string(),
        }
    }
}

/// Results for a whole batch.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchReport {
    pub videos: Vec<VideoReport>,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub windows: u64,
    pub frames_emitted: u64,
    /// Output paths written by more than one video in this batch.
    pub overwritten: Vec<PathBuf>,
}

impl BatchReport {
    fn push(&mut self, report: VideoReport) {
        match report.outcome {
            RunOutcome::Completed => self.completed += 1,
            RunOutcome::Cancelled => self.cancelled = true,
            RunOutcome::Failed(_) => self.failed += 1,
        }
        self.windows += report.windows;
        self.frames_emitted += report.frames_emitted;
        self.videos.push(report);
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("report serialization failed: {}", e)))
    }
}

/// Windowed inference over one video at a time.
pub struct Pipeline<'m> {
    models: &'m Models,
    preprocessor: Preprocessor,
    window_size: usize,
}

impl<'m> Pipeline<'m> {
    pub fn new(
        models: &'m Models,
        preprocessor: Preprocessor,
        window_size: usize,
    ) -> Result<Self, PipelineError> {
        if window_size == 0 {
            return Err(PipelineError::Config(
                "window size must be at least 1 frame".to_string(),
            ));
        }
        Ok(Self {
            models,
            preprocessor,
            window_size,
        })
    }

    pub fn from_config(models: &'m Models, config: &AnnotateConfig) -> Result<Self, PipelineError> {
        Self::new(models, config.preprocessor(), config.window_size)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Stream one video through the models into `sink`.
    ///
    /// Never returns an error: per-file failures are recorded in the report.
    pub fn run_video<W: Write>(
        &self,
        input: &Path,
        sink: &mut OutputSink<W>,
        cancel: &CancelToken,
        stage: Option<&StageGuard>,
    ) -> VideoReport {
        let mut report = VideoReport::new(input);
        let mut machine = StateMachine::new(input);

        let mut source = match FileSource::open(input) {
            Ok(source) => source,
            Err(err) => {
                report.fail(&err);
                machine.advance(StreamState::Closed);
                return report;
            }
        };
        let mut session = match sink.open(input) {
            Ok(session) => session,
            Err(err) => {
                report.fail(&err);
                machine.advance(StreamState::Closed);
                return report;
            }
        };
        let mut buffer = match ClipBuffer::new(self.window_size) {
            Ok(buffer) => buffer,
            Err(err) => {
                report.fail(&err);
                machine.advance(StreamState::Closed);
                return report;
            }
        };

        machine.advance(StreamState::Streaming);
        let streamed = self.stream(
            &mut source,
            &mut buffer,
            &mut session,
            &mut report,
            &mut machine,
            cancel,
            stage,
        );

        machine.advance(StreamState::Draining);
        report.frames_dropped = buffer.discard() as u64;
        if report.frames_dropped > 0 {
            log::debug!(
                "{}: dropped {} trailing frames",
                input.display(),
                report.frames_dropped
            );
        }
        source.close();

        match streamed {
            Ok(()) => match session.finish() {
                Ok(output) => report.output = output,
                Err(err) => report.fail(&err),
            },
            Err(err) => {
                drop(session);
                report.fail(&err);
            }
        }
        machine.advance(StreamState::Closed);

        if report.outcome == RunOutcome::Completed {
            log::info!(
                "{}: {} frames read, {} windows, {} frames emitted",
                input.display(),
                report.frames_read,
                report.windows,
                report.frames_emitted
            );
        }
        report
    }

    #[allow(clippy::too_many_arguments)]
    fn stream<W: Write>(
        &self,
        source: &mut FileSource,
        buffer: &mut ClipBuffer,
        session: &mut SinkSession<'_, W>,
        report: &mut VideoReport,
        machine: &mut StateMachine,
        cancel: &CancelToken,
        stage: Option<&StageGuard>,
    ) -> Result<(), PipelineError> {
        loop {
            if cancel.is_cancelled() {
                log::info!("{}: cancelled", report.path.display());
                report.outcome = RunOutcome::Cancelled;
                return Ok(());
            }
            let Some(frame) = source.next_frame()? else {
                return Ok(());
            };
            report.frames_read += 1;

            let Some(window) = buffer.push(frame) else {
                continue;
            };
            machine.advance(StreamState::Inferring);
            match self.process_window(window, session) {
                Ok(emitted) => {
                    report.windows += 1;
                    report.frames_emitted += emitted;
                }
                Err(err @ PipelineError::InvalidFrameShape { .. }) => {
                    log::warn!("{}: window aborted: {}", report.path.display(), err);
                    report.windows_aborted += 1;
                }
                Err(err) => return Err(err),
            }
            if let Some(stage) = stage {
                stage.progress(report.frames_read, report.windows);
            }
            machine.advance(StreamState::Streaming);
        }
    }

    fn process_window<W: Write>(
        &self,
        window: ClipWindow,
        session: &mut SinkSession<'_, W>,
    ) -> Result<u64, PipelineError> {
        let clip = self.preprocessor.preprocess(&window)?;
        let prediction = self.models.predict(&clip)?;
        log::debug!(
            "frames {}-{}: {} {:.6}",
            window.first_id(),
            window.last_id(),
            prediction.label,
            prediction.confidence
        );
        let frames = annotate(window, &prediction);
        session.write(&frames)?;
        Ok(frames.len() as u64)
    }
}

/// Regular, non-hidden files in `dir`, sorted by name.
pub fn list_videos(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::source_unavailable(dir, e))?;
    let mut videos = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::source_unavailable(dir, e))?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if is_file && !hidden {
            videos.push(entry.path());
        }
    }
    videos.sort();
    Ok(videos)
}

/// Process `videos` in order, stopping early only on cancellation.
pub fn run_batch<W: Write>(
    pipeline: &Pipeline<'_>,
    videos: &[PathBuf],
    sink: &mut OutputSink<W>,
    cancel: &CancelToken,
    ui: &Ui,
) -> BatchReport {
    log::info!("processing {} videos", videos.len());
    let mut batch = BatchReport::default();
    let mut written = HashSet::new();
    for video in videos {
        if cancel.is_cancelled() {
            break;
        }
        let name = video
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| video.display().to_string());
        log::info!("{}", name);

        let mut stage = ui.stage(&name);
        let report = pipeline.run_video(video, sink, cancel, Some(&stage));
        stage.set_status(report.summary());
        drop(stage);
        if let Some(output) = &report.output {
            if !written.insert(output.clone()) {
                log::warn!(
                    "{} overwrote the output of an earlier video: {}",
                    name,
                    output.display()
                );
                batch.overwritten.push(output.clone());
            }
        }
        batch.push(report);
    }
    if let Err(err) = sink.close() {
        log::warn!("{}", err);
    }
    log::info!(
        "batch finished: {} completed, {} failed{}",
        batch.completed,
        batch.failed,
        if batch.cancelled { ", cancelled" } else { "" }
    );
    batch
}
