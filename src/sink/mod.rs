//! Output sinks.
//!
//! A run writes to exactly one sink kind. `LogSink` prints a line per frame to a
//! shared stream; `VideoSink` writes one annotated video per input file.

#[cfg(feature = "ffmpeg")]
mod ffmpeg;
mod log;
mod video;
mod y4m;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::annotate::AnnotatedFrame;
use crate::config::AnnotateConfig;
use crate::error::PipelineError;

pub use self::log::LogSink;
pub use video::{VideoSession, VideoSink};

/// Container written by `VideoSink`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    /// MPEG-4 Part 2 in MP4. Needs the `ffmpeg` feature.
    Mp4,
    /// Uncompressed YUV4MPEG2, always available.
    Y4m,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Y4m => "y4m",
        }
    }

    /// Whether this build can write the container.
    pub fn is_available(self) -> bool {
        match self {
            Self::Mp4 => cfg!(feature = "ffmpeg"),
            Self::Y4m => true,
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        if cfg!(feature = "ffmpeg") {
            Self::Mp4
        } else {
            Self::Y4m
        }
    }
}

impl FromStr for Container {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "y4m" => Ok(Self::Y4m),
            other => Err(PipelineError::Config(format!(
                "unknown container '{}', expected mp4 or y4m",
                other
            ))),
        }
    }
}

/// Frame encoder behind a `VideoSession`.
pub(crate) trait VideoEncoder {
    /// Append one RGB24 frame at the encoder's resolution.
    fn write_frame(&mut self, rgb: &[u8]) -> Result<(), PipelineError>;
    /// Flush buffered frames and close the container.
    fn finish(self: Box<Self>) -> Result<(), PipelineError>;
}

pub(crate) fn open_encoder(
    container: Container,
    path: &Path,
    width: u32,
    height: u32,
    fps: u32,
) -> Result<Box<dyn VideoEncoder>, PipelineError> {
    match container {
        Container::Y4m => Ok(Box::new(y4m::Y4mEncoder::create(path, width, height, fps)?)),
        #[cfg(feature = "ffmpeg")]
        Container::Mp4 => Ok(Box::new(ffmpeg::FfmpegEncoder::create(
            path, width, height, fps,
        )?)),
        #[cfg(not(feature = "ffmpeg"))]
        Container::Mp4 => Err(PipelineError::sink_write(
            path,
            "mp4 output requires the ffmpeg feature",
        )),
    }
}

/// `<dir>/<stem>-<suffix>.<ext>` for an input path.
pub fn output_path(dir: &Path, input: &Path, suffix: &str, container: Container) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    dir.join(format!("{}-{}.{}", stem, suffix, container.extension()))
}

/// The sink selected for a run.
pub enum OutputSink<W: Write> {
    Log(LogSink<W>),
    Video(VideoSink),
}

impl<W: Write> OutputSink<W> {
    /// Log mode writes to `out`; video mode ignores it.
    pub fn from_config(config: &AnnotateConfig, out: W) -> Self {
        if config.log_mode {
            Self::Log(LogSink::new(out))
        } else {
            Self::Video(VideoSink::new(config.output.clone()))
        }
    }

    /// Start output for one input video.
    pub fn open(&mut self, input: &Path) -> Result<SinkSession<'_, W>, PipelineError> {
        match self {
            Self::Log(sink) => Ok(SinkSession::Log(sink)),
            Self::Video(sink) => Ok(SinkSession::Video(sink.open(input)?)),
        }
    }

    pub fn is_log(&self) -> bool {
        matches!(self, Self::Log(_))
    }

    /// Finish the run, flushing the shared log stream.
    pub fn close(&mut self) -> Result<(), PipelineError> {
        match self {
            Self::Log(sink) => sink.flush(),
            Self::Video(_) => Ok(()),
        }
    }
}

/// Output for a single video.
///
/// Dropping a session without `finish` releases its resources; a video file may
/// be left without a trailer.
pub enum SinkSession<'a, W: Write> {
    Log(&'a mut LogSink<W>),
    Video(VideoSession),
}

impl<W: Write> SinkSession<'_, W> {
    pub fn write(&mut self, frames: &[AnnotatedFrame]) -> Result<(), PipelineError> {
        match self {
            Self::Log(sink) => sink.write(frames),
            Self::Video(session) => session.write(frames),
        }
    }

    /// Returns the written file in video mode.
    pub fn finish(self) -> Result<Option<PathBuf>, PipelineError> {
        match self {
            Self::Log(sink) => sink.flush().map(|_| None),
            Self::Video(session) => session.finish().map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_names_use_stem_and_suffix() {
        let path = output_path(
            Path::new("/out"),
            Path::new("/videos/clip.final.avi"),
            "c3d",
            Container::Y4m,
        );
        assert_eq!(path, PathBuf::from("/out/clip.final-c3d.y4m"));
    }

    #[test]
    fn parses_containers() {
        assert_eq!("MP4".parse::<Container>().unwrap(), Container::Mp4);
        assert_eq!("y4m".parse::<Container>().unwrap(), Container::Y4m);
        assert!("avi".parse::<Container>().is_err());
        assert!(Container::Y4m.is_available());
        assert!(Container::default().is_available());
    }

    #[test]
    fn log_mode_selects_log_sink() {
        let cfg = AnnotateConfig::default();
        let sink = OutputSink::from_config(&cfg, Vec::new());
        assert!(sink.is_log());

        let mut cfg = AnnotateConfig::default();
        cfg.log_mode = false;
        let sink = OutputSink::from_config(&cfg, Vec::new());
        assert!(!sink.is_log());
    }
}
