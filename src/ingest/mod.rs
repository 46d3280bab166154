//! Frame ingestion sources.
//!
//! This module provides sequential frame sources for local files:
//! - Video containers decoded with FFmpeg (feature: ffmpeg)
//! - Synthetic clip descriptors (`.synth`) for tests and dry runs
//!
//! All sources produce `Frame` instances numbered from 1. The ingestion layer is
//! responsible for:
//! - Converting decoded pictures to packed RGB24
//! - Assigning contiguous frame ids
//! - Releasing decoder resources on `close()` or drop
//!
//! Sources are read strictly in order; there is no seeking.

pub mod file;
#[cfg(feature = "ffmpeg")]
pub(crate) mod file_ffmpeg;
mod synthetic;

pub use file::{FileSource, SourceStats};
pub use synthetic::{ClipDescriptor, SYNTHETIC_EXTENSION};
