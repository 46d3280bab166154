//! Synthetic clip descriptors.
//!
//! A `.synth` file is a small JSON document describing a clip to generate:
//!
//! ```json
//! {"frames": 150, "width": 320, "height": 240, "seed": 7, "degenerate_frames": [65]}
//! ```
//!
//! Frames are a moving gradient plus seeded noise, so the same descriptor always
//! yields the same pixels. Ids listed in `degenerate_frames` come out as 0x0
//! rasters, which exercises the invalid-shape path downstream.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use super::file::DecodedPicture;
use crate::error::PipelineError;

/// File extension recognised as a synthetic clip.
pub const SYNTHETIC_EXTENSION: &str = "synth";

const MAX_SYNTHETIC_DIM: u32 = 4096;

#[derive(Clone, Debug, Deserialize)]
pub struct ClipDescriptor {
    pub frames: u64,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub degenerate_frames: Vec<u64>,
}

fn default_width() -> u32 {
    320
}

fn default_height() -> u32 {
    240
}

pub(crate) struct SyntheticFileSource {
    descriptor: ClipDescriptor,
    rng: StdRng,
    emitted: u64,
}

impl SyntheticFileSource {
    pub(crate) fn open(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::source_unavailable(path, e))?;
        let descriptor: ClipDescriptor = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::source_unavailable(path, format!("invalid clip descriptor: {}", e))
        })?;
        if descriptor.width == 0
            || descriptor.height == 0
            || descriptor.width > MAX_SYNTHETIC_DIM
            || descriptor.height > MAX_SYNTHETIC_DIM
        {
            return Err(PipelineError::source_unavailable(
                path,
                format!(
                    "clip descriptor dimensions {}x{} out of range",
                    descriptor.width, descriptor.height
                ),
            ));
        }
        log::info!(
            "FileSource: connected to {} (synthetic, {} frames)",
            path.display(),
            descriptor.frames
        );
        Ok(Self {
            rng: StdRng::seed_from_u64(descriptor.seed),
            descriptor,
            emitted: 0,
        })
    }

    pub(crate) fn next_picture(&mut self) -> Result<Option<DecodedPicture>, String> {
        if self.emitted >= self.descriptor.frames {
            return Ok(None);
        }
        self.emitted += 1;

        if self.descriptor.degenerate_frames.contains(&self.emitted) {
            return Ok(Some(DecodedPicture {
                width: 0,
                height: 0,
                pixels: Vec::new(),
            }));
        }

        let width = self.descriptor.width;
        let height = self.descriptor.height;
        Ok(Some(DecodedPicture {
            width,
            height,
            pixels: self.generate_pixels(width, height),
        }))
    }

    fn generate_pixels(&mut self, width: u32, height: u32) -> Vec<u8> {
        let w = width as usize;
        let h = height as usize;
        let shift = (self.emitted as usize).wrapping_mul(1 + (self.descriptor.seed % 5) as usize);
        let mut pixels = vec![0u8; w * h * 3];
        for y in 0..h {
            for x in 0..w {
                let offset = (y * w + x) * 3;
                let noise: u8 = self.rng.gen_range(0..16);
                pixels[offset] = ((x + shift) % 256) as u8 ^ noise;
                pixels[offset + 1] = ((y * 2 + shift / 2) % 256) as u8;
                pixels[offset + 2] = ((x + y) % 256) as u8 ^ noise;
            }
        }
        pixels
    }
}
