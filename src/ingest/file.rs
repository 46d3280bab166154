//! Local file frame source.
//!
//! `FileSource` reads frames from one local video file. It:
//! - Picks a decoding backend from the path (synthetic descriptor or FFmpeg)
//! - Numbers frames 1, 2, 3, ... in read order, never resetting
//! - Reports end-of-stream as `None`
//!
//! The source MUST NOT:
//! - Fetch remote URLs
//! - Seek or reorder frames

use std::path::{Path, PathBuf};

#[cfg(feature = "ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::{SyntheticFileSource, SYNTHETIC_EXTENSION};
use crate::error::PipelineError;
use crate::frame::Frame;

/// Decoded picture before it is numbered.
pub(crate) struct DecodedPicture {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Sequential frame source over one local file.
pub struct FileSource {
    path: PathBuf,
    backend: Option<FileBackend>,
    frames_read: u64,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    /// Open a local video file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        if !is_local_file_path(path) {
            return Err(PipelineError::source_unavailable(
                path,
                "file ingestion only supports local paths (no URL schemes)",
            ));
        }
        if !path.is_file() {
            return Err(PipelineError::source_unavailable(path, "not a readable file"));
        }

        let backend = if has_extension(path, SYNTHETIC_EXTENSION) {
            FileBackend::Synthetic(SyntheticFileSource::open(path)?)
        } else {
            open_decoder(path)?
        };
        log::debug!("FileSource: opened {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            backend: Some(backend),
            frames_read: 0,
        })
    }

    /// Read the next frame, or `None` at end-of-stream.
    ///
    /// A closed source behaves as exhausted.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        let Some(backend) = self.backend.as_mut() else {
            return Ok(None);
        };
        let picture = match backend {
            FileBackend::Synthetic(source) => source.next_picture(),
            #[cfg(feature = "ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_picture(),
        }
        .map_err(|reason| PipelineError::SourceRead {
            path: self.path.clone(),
            reason,
        })?;

        Ok(picture.map(|picture| {
            self.frames_read += 1;
            Frame::new(
                self.frames_read,
                picture.width,
                picture.height,
                picture.pixels,
            )
        }))
    }

    /// Release decoder resources. Safe to call more than once.
    pub fn close(&mut self) {
        if self.backend.take().is_some() {
            log::debug!(
                "FileSource: closed {} after {} frames",
                self.path.display(),
                self.frames_read
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get frame statistics.
    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frames_read,
            path: self.path.clone(),
        }
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_read: u64,
    pub path: PathBuf,
}

#[cfg(feature = "ffmpeg")]
fn open_decoder(path: &Path) -> Result<FileBackend, PipelineError> {
    FfmpegFileSource::open(path)
        .map(FileBackend::Ffmpeg)
        .map_err(|reason| PipelineError::source_unavailable(path, reason))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_decoder(path: &Path) -> Result<FileBackend, PipelineError> {
    Err(PipelineError::source_unavailable(
        path,
        "video decoding requires the ffmpeg feature",
    ))
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn is_local_file_path(path: &Path) -> bool {
    let Some(raw) = path.to_str() else {
        return true;
    };
    !raw.trim().is_empty() && !raw.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_descriptor(dir: &Path, name: &str, json: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(json.as_bytes()).unwrap();
        path
    }

    #[test]
    fn frame_ids_are_contiguous_from_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_descriptor(
            dir.path(),
            "walk.synth",
            r#"{"frames": 7, "width": 8, "height": 6}"#,
        );
        let mut source = FileSource::open(&path).unwrap();
        let mut ids = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.pixels().len(), 8 * 6 * 3);
            ids.push(frame.id);
        }
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());
        assert_eq!(source.stats().frames_read, 7);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_descriptor(dir.path(), "a.synth", r#"{"frames": 3}"#);
        let mut source = FileSource::open(&path).unwrap();
        assert!(source.next_frame().unwrap().is_some());
        source.close();
        source.close();
        assert!(source.is_closed());
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.stats().frames_read, 1);
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileSource::open(dir.path().join("absent.mp4")).err().unwrap();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }

    #[test]
    fn url_paths_are_rejected() {
        let err = FileSource::open("rtsp://camera/stream").err().unwrap();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }

    #[test]
    fn corrupt_descriptor_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_descriptor(dir.path(), "bad.synth", "not json");
        let err = FileSource::open(&path).err().unwrap();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn container_files_need_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_descriptor(dir.path(), "clip.mp4", "\0\0\0\x18ftypmp42");
        let err = FileSource::open(&path).err().unwrap();
        assert!(err.to_string().contains("ffmpeg"));
    }
}
