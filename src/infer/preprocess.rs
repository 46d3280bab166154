use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};

use crate::error::PipelineError;
use crate::frame::ClipWindow;
use crate::infer::result::ClipTensor;

/// Per-channel RGB mean of the Sports-1M training crops, in pixel units.
pub const SPORTS1M_MEAN: [f32; 3] = [90.25, 97.66, 101.41];

/// Default spatial input of the clip extractor.
pub const DEFAULT_INPUT_SIZE: u32 = 112;

/// Turns a clip window into the extractor's input tensor.
///
/// Every frame is resized to `width x height` (bilinear), mean-subtracted and
/// divided by `scale` per channel, then laid out as `[1, 3, T, H, W]` in window
/// order. Holds no state between calls.
#[derive(Clone, Debug, PartialEq)]
pub struct Preprocessor {
    width: u32,
    height: u32,
    mean: [f32; 3],
    scale: [f32; 3],
}

impl Preprocessor {
    pub fn new(width: u32, height: u32, mean: [f32; 3], scale: [f32; 3]) -> Self {
        Self {
            width,
            height,
            mean,
            scale,
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn preprocess(&self, window: &ClipWindow) -> Result<ClipTensor, PipelineError> {
        let frames = window.len();
        let w = self.width as usize;
        let h = self.height as usize;
        let plane = w * h;
        let mut data = vec![0f32; 3 * frames * plane];

        for (t, frame) in window.frames().iter().enumerate() {
            frame.validate_shape()?;
            let source: ImageBuffer<Rgb<u8>, &[u8]> =
                ImageBuffer::from_raw(frame.width, frame.height, frame.pixels()).ok_or_else(
                    || PipelineError::InvalidFrameShape {
                        frame_id: frame.id,
                        width: frame.width,
                        height: frame.height,
                        reason: "pixel buffer does not match dimensions".to_string(),
                    },
                )?;

            let resized;
            let raster: &[u8] = if frame.width == self.width && frame.height == self.height {
                frame.pixels()
            } else {
                resized = imageops::resize(&source, self.width, self.height, FilterType::Triangle);
                resized.as_raw()
            };

            for (i, px) in raster.chunks_exact(3).enumerate() {
                for c in 0..3 {
                    let value = (px[c] as f32 - self.mean[c]) / self.scale[c];
                    data[(c * frames + t) * plane + i] = value;
                }
            }
        }

        Ok(ClipTensor::new([1, 3, frames, h, w], data))
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(
            DEFAULT_INPUT_SIZE,
            DEFAULT_INPUT_SIZE,
            SPORTS1M_MEAN,
            [1.0; 3],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{ClipBuffer, Frame};

    fn window_of(frames: Vec<Frame>) -> ClipWindow {
        let mut buf = ClipBuffer::new(frames.len()).unwrap();
        let mut out = None;
        for frame in frames {
            out = buf.push(frame);
        }
        out.expect("window")
    }

    fn solid(id: u64, w: u32, h: u32, rgb: [u8; 3]) -> Frame {
        let pixels = rgb.iter().copied().cycle().take((w * h * 3) as usize).collect();
        Frame::new(id, w, h, pixels)
    }

    #[test]
    fn resizes_and_normalizes_in_order() {
        let pre = Preprocessor::new(4, 2, [10.0, 20.0, 30.0], [2.0, 1.0, 1.0]);
        let window = window_of(vec![
            solid(1, 16, 8, [30, 40, 50]),
            solid(2, 4, 2, [110, 120, 130]),
        ]);
        let tensor = pre.preprocess(&window).unwrap();
        assert_eq!(tensor.shape(), [1, 3, 2, 2, 4]);
        assert_eq!(tensor.at(0, 0, 1, 3), 10.0);
        assert_eq!(tensor.at(1, 0, 0, 0), 20.0);
        assert_eq!(tensor.at(0, 1, 0, 0), 50.0);
        assert_eq!(tensor.at(2, 1, 1, 1), 100.0);
    }

    #[test]
    fn deterministic() {
        let pre = Preprocessor::default();
        let make = || window_of((1..=3).map(|id| solid(id, 40, 30, [id as u8, 9, 200])).collect());
        assert_eq!(
            pre.preprocess(&make()).unwrap(),
            pre.preprocess(&make()).unwrap()
        );
    }

    #[test]
    fn empty_raster_is_invalid_shape() {
        let pre = Preprocessor::default();
        let window = window_of(vec![solid(1, 8, 8, [0, 0, 0]), Frame::new(2, 0, 0, Vec::new())]);
        match pre.preprocess(&window) {
            Err(PipelineError::InvalidFrameShape { frame_id, .. }) => assert_eq!(frame_id, 2),
            other => panic!("expected invalid shape, got {:?}", other),
        }
    }
}
