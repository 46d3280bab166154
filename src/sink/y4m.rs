//! YUV4MPEG2 writer (4:4:4, progressive, square pixels).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::VideoEncoder;
use crate::error::PipelineError;

pub(crate) struct Y4mEncoder {
    path: PathBuf,
    out: BufWriter<File>,
    width: u32,
    height: u32,
    planes: Vec<u8>,
}

impl Y4mEncoder {
    pub(crate) fn create(
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Self, PipelineError> {
        let file = File::create(path).map_err(|e| PipelineError::sink_write(path, e))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "YUV4MPEG2 W{} H{} F{}:1 Ip A1:1 C444", width, height, fps)
            .map_err(|e| PipelineError::sink_write(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            out,
            width,
            height,
            planes: vec![0u8; width as usize * height as usize * 3],
        })
    }
}

impl VideoEncoder for Y4mEncoder {
    fn write_frame(&mut self, rgb: &[u8]) -> Result<(), PipelineError> {
        let plane = self.width as usize * self.height as usize;
        if rgb.len() != plane * 3 {
            return Err(PipelineError::sink_write(
                &self.path,
                format!("expected {} RGB bytes, received {}", plane * 3, rgb.len()),
            ));
        }
        for (i, px) in rgb.chunks_exact(3).enumerate() {
            let (y, u, v) = rgb_to_yuv(px[0], px[1], px[2]);
            self.planes[i] = y;
            self.planes[plane + i] = u;
            self.planes[2 * plane + i] = v;
        }
        self.out
            .write_all(b"FRAME\n")
            .and_then(|_| self.out.write_all(&self.planes))
            .map_err(|e| PipelineError::sink_write(&self.path, e))
    }

    fn finish(mut self: Box<Self>) -> Result<(), PipelineError> {
        self.out
            .flush()
            .map_err(|e| PipelineError::sink_write(&self.path, e))
    }
}

/// BT.601 studio-swing conversion.
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (clamp_to_u8(y), clamp_to_u8(u), clamp_to_u8(v))
}

fn clamp_to_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}
