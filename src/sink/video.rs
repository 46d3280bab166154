use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};

use super::{open_encoder, output_path, VideoEncoder};
use crate::annotate::AnnotatedFrame;
use crate::config::OutputSettings;
use crate::error::PipelineError;

/// Writes one annotated video per input at a fixed resolution and frame rate.
#[derive(Clone, Debug)]
pub struct VideoSink {
    settings: OutputSettings,
}

impl VideoSink {
    pub fn new(settings: OutputSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &OutputSettings {
        &self.settings
    }

    /// Path the annotated copy of `input` is written to.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        output_path(
            &self.settings.dir,
            input,
            &self.settings.suffix,
            self.settings.container,
        )
    }

    /// Create the output file for `input`, replacing any previous one.
    pub fn open(&self, input: &Path) -> Result<VideoSession, PipelineError> {
        std::fs::create_dir_all(&self.settings.dir)
            .map_err(|e| PipelineError::sink_write(&self.settings.dir, e))?;
        let path = self.output_path(input);
        let encoder = open_encoder(
            self.settings.container,
            &path,
            self.settings.width,
            self.settings.height,
            self.settings.fps,
        )?;
        log::debug!("writing {}", path.display());
        Ok(VideoSession {
            path,
            encoder: Some(encoder),
            width: self.settings.width,
            height: self.settings.height,
            frames_written: 0,
        })
    }
}

/// An open output file.
pub struct VideoSession {
    path: PathBuf,
    encoder: Option<Box<dyn VideoEncoder>>,
    width: u32,
    height: u32,
    frames_written: u64,
}

impl VideoSession {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append frames in order, resized to the output raster.
    pub fn write(&mut self, frames: &[AnnotatedFrame]) -> Result<(), PipelineError> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| PipelineError::sink_write(&self.path, "session already finished"))?;
        for annotated in frames {
            let frame = &annotated.frame;
            if frame.width == self.width && frame.height == self.height {
                encoder.write_frame(frame.pixels())?;
            } else {
                let source: ImageBuffer<Rgb<u8>, &[u8]> =
                    ImageBuffer::from_raw(frame.width, frame.height, frame.pixels()).ok_or_else(
                        || {
                            PipelineError::sink_write(
                                &self.path,
                                format!("frame {} does not match its dimensions", frame.id),
                            )
                        },
                    )?;
                let resized = imageops::resize(&source, self.width, self.height, FilterType::Triangle);
                encoder.write_frame(resized.as_raw())?;
            }
            self.frames_written += 1;
        }
        Ok(())
    }

    /// Flush and close the file, returning its path.
    pub fn finish(mut self) -> Result<PathBuf, PipelineError> {
        if let Some(encoder) = self.encoder.take() {
            encoder.finish()?;
        }
        log::debug!(
            "closed {} after {} frames",
            self.path.display(),
            self.frames_written
        );
        Ok(std::mem::take(&mut self.path))
    }
}

impl Drop for VideoSession {
    fn drop(&mut self) {
        if self.encoder.take().is_some() {
            log::debug!("released unfinished output {}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::infer::Prediction;
    use crate::sink::Container;

    fn settings(dir: &Path) -> OutputSettings {
        OutputSettings {
            dir: dir.to_path_buf(),
            width: 8,
            height: 4,
            fps: 30,
            suffix: "c3d".into(),
            container: Container::Y4m,
        }
    }

    fn annotated(id: u64, w: u32, h: u32) -> AnnotatedFrame {
        AnnotatedFrame {
            frame: Frame::new(id, w, h, vec![50u8; (w * h * 3) as usize]),
            prediction: Prediction {
                label: "action".into(),
                confidence: 0.75,
            },
            caption: "action: 0.750000".into(),
        }
    }

    #[test]
    fn writes_resized_frames_to_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("nested");
        let sink = VideoSink::new(settings(&out_dir));
        let mut session = sink.open(Path::new("/videos/run.avi")).unwrap();
        session
            .write(&[annotated(1, 16, 8), annotated(2, 8, 4), annotated(3, 3, 3)])
            .unwrap();
        assert_eq!(session.frames_written(), 3);
        let path = session.finish().unwrap();
        assert_eq!(path, out_dir.join("run-c3d.y4m"));

        let bytes = std::fs::read(&path).unwrap();
        let header = b"YUV4MPEG2 W8 H4 F30:1 Ip A1:1 C444\n";
        assert_eq!(bytes.len(), header.len() + 3 * (6 + 8 * 4 * 3));
    }

    #[test]
    fn mismatched_frame_buffer_is_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = VideoSink::new(settings(dir.path()));
        let mut session = sink.open(Path::new("clip.mp4")).unwrap();
        let mut bad = annotated(1, 16, 8);
        bad.frame = Frame::new(1, 16, 8, vec![0u8; 5]);
        assert!(matches!(
            session.write(&[bad]),
            Err(PipelineError::SinkWrite { .. })
        ));
    }

    #[test]
    fn reopening_truncates_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let sink = VideoSink::new(settings(dir.path()));
        let mut first = sink.open(Path::new("clip.mp4")).unwrap();
        first.write(&[annotated(1, 8, 4), annotated(2, 8, 4)]).unwrap();
        let path = first.finish().unwrap();
        let len_two = std::fs::metadata(&path).unwrap().len();

        let mut second = sink.open(Path::new("clip.mp4")).unwrap();
        second.write(&[annotated(1, 8, 4)]).unwrap();
        second.finish().unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() < len_two);
    }
}
