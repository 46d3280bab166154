//! Frames and clip windowing.
//!
//! - `Frame`: one decoded RGB24 raster with its 1-based sequence number.
//! - `ClipWindow`: exactly `window_size` consecutive frames. Only `ClipBuffer` builds one.
//! - `ClipBuffer`: collects frames and emits non-overlapping windows.
//!
//! Frames that never complete a window are discarded at end-of-stream.

use crate::error::PipelineError;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One decoded frame. Pixels are packed RGB24, row-major, no padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number assigned by the source, starting at 1.
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    /// Wrap decoded pixels. Shape is not validated here; the preprocessor
    /// rejects unusable rasters.
    pub fn new(id: u64, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            id,
            width,
            height,
            pixels,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Expected byte length for the declared dimensions, if it fits in `usize`.
    pub fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(3))
    }

    /// Check the raster is non-empty and its buffer matches its dimensions.
    pub fn validate_shape(&self) -> Result<(), PipelineError> {
        if self.width == 0 || self.height == 0 {
            return Err(self.shape_error("empty raster"));
        }
        match self.expected_len() {
            Some(expected) if expected == self.pixels.len() => Ok(()),
            Some(expected) => Err(self.shape_error(format!(
                "expected {} RGB bytes, received {}",
                expected,
                self.pixels.len()
            ))),
            None => Err(self.shape_error("frame dimensions overflow")),
        }
    }

    fn shape_error(&self, reason: impl Into<String>) -> PipelineError {
        PipelineError::InvalidFrameShape {
            frame_id: self.id,
            width: self.width,
            height: self.height,
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// ClipWindow
// ----------------------------------------------------------------------------

/// A complete, immutable window of consecutive frames.
///
/// There is no public constructor: a window exists only when a `ClipBuffer`
/// has accumulated exactly its configured number of frames.
#[derive(Debug)]
pub struct ClipWindow {
    frames: Vec<Frame>,
}

impl ClipWindow {
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Id of the first frame in the window.
    pub fn first_id(&self) -> u64 {
        self.frames.first().map(|f| f.id).unwrap_or(0)
    }

    /// Id of the last frame in the window.
    pub fn last_id(&self) -> u64 {
        self.frames.last().map(|f| f.id).unwrap_or(0)
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

// ----------------------------------------------------------------------------
// ClipBuffer
// ----------------------------------------------------------------------------

/// Accumulates frames and emits fixed-size, non-overlapping windows.
pub struct ClipBuffer {
    frames: Vec<Frame>,
    window_size: usize,
}

impl ClipBuffer {
    pub fn new(window_size: usize) -> Result<Self, PipelineError> {
        if window_size == 0 {
            return Err(PipelineError::Config(
                "window size must be at least 1 frame".to_string(),
            ));
        }
        Ok(Self {
            frames: Vec::with_capacity(window_size),
            window_size,
        })
    }

    /// Append a frame. Returns the completed window when this frame fills it,
    /// leaving the buffer empty.
    pub fn push(&mut self, frame: Frame) -> Option<ClipWindow> {
        self.frames.push(frame);
        if self.frames.len() < self.window_size {
            return None;
        }
        let frames = std::mem::replace(&mut self.frames, Vec::with_capacity(self.window_size));
        Some(ClipWindow { frames })
    }

    /// Drop residual frames at end-of-stream. Returns how many were dropped.
    pub fn discard(&mut self) -> usize {
        let dropped = self.frames.len();
        self.frames.clear();
        dropped
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Frames currently buffered (always below `window_size`).
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_frame(id: u64) -> Frame {
        Frame::new(id, 2, 2, vec![id as u8; 12])
    }

    #[test]
    fn buffer_emits_exact_windows() {
        let mut buf = ClipBuffer::new(3).unwrap();
        assert!(buf.push(make_test_frame(1)).is_none());
        assert!(buf.push(make_test_frame(2)).is_none());
        let window = buf.push(make_test_frame(3)).expect("full window");
        assert_eq!(window.len(), 3);
        assert_eq!(window.first_id(), 1);
        assert_eq!(window.last_id(), 3);
        assert!(buf.is_empty());
    }

    #[test]
    fn windows_do_not_overlap() {
        let mut buf = ClipBuffer::new(4).unwrap();
        let mut windows = Vec::new();
        for id in 1..=10 {
            if let Some(window) = buf.push(make_test_frame(id)) {
                windows.push(window);
            }
        }
        assert_eq!(windows.len(), 2);
        let ids: Vec<u64> = windows
            .iter()
            .flat_map(|w| w.frames().iter().map(|f| f.id))
            .collect();
        assert_eq!(ids, (1..=8).collect::<Vec<_>>());
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.discard(), 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn window_of_one_frame() {
        let mut buf = ClipBuffer::new(1).unwrap();
        let window = buf.push(make_test_frame(7)).expect("window");
        assert_eq!(window.into_frames()[0].id, 7);
    }

    #[test]
    fn zero_window_size_is_rejected() {
        assert!(matches!(ClipBuffer::new(0), Err(PipelineError::Config(_))));
    }

    #[test]
    fn shape_validation() {
        assert!(make_test_frame(1).validate_shape().is_ok());

        let empty = Frame::new(4, 0, 0, Vec::new());
        assert!(matches!(
            empty.validate_shape(),
            Err(PipelineError::InvalidFrameShape { frame_id: 4, .. })
        ));

        let short = Frame::new(5, 4, 4, vec![0u8; 10]);
        assert!(short.validate_shape().is_err());
    }
}
