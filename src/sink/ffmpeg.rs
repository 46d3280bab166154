//! MPEG-4 Part 2 encoder writing through FFmpeg.
//!
//! RGB24 input is converted to YUV420P, encoded at a constant frame rate, and
//! muxed into whatever container the output extension selects (MP4 by default).
//! Dropping the encoder without `finish` closes the file without a trailer.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;

use super::VideoEncoder;
use crate::error::PipelineError;

pub(crate) struct FfmpegEncoder {
    path: PathBuf,
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::video::Encoder,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    next_pts: i64,
}

impl FfmpegEncoder {
    pub(crate) fn create(
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Self, PipelineError> {
        let fail = |stage: &str, e: ffmpeg::Error| {
            PipelineError::sink_write(path, format!("{}: {}", stage, e))
        };
        ffmpeg::init().map_err(|e| fail("initialize ffmpeg", e))?;

        let mut output = ffmpeg::format::output(&path).map_err(|e| fail("open output", e))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::flag::Flags::GLOBAL_HEADER);

        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| PipelineError::sink_write(path, "MPEG-4 encoder not available"))?;
        let mut stream = output
            .add_stream(codec)
            .map_err(|e| fail("add video stream", e))?;
        let stream_index = stream.index();

        let fps = fps as i32;
        let encoder_time_base = ffmpeg::Rational::new(1, fps);
        let mut video = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| fail("create video encoder", e))?;
        video.set_width(width);
        video.set_height(height);
        video.set_format(ffmpeg::format::Pixel::YUV420P);
        video.set_time_base(encoder_time_base);
        video.set_frame_rate(Some(ffmpeg::Rational::new(fps, 1)));
        if global_header {
            video.set_flags(ffmpeg::codec::flag::Flags::GLOBAL_HEADER);
        }

        let encoder = video
            .open_as(codec)
            .map_err(|e| fail("open video encoder", e))?;
        stream.set_parameters(&encoder);
        stream.set_time_base(encoder_time_base);

        output
            .write_header()
            .map_err(|e| fail("write container header", e))?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or(encoder_time_base);

        let scaler = ffmpeg::software::scaling::Context::get(
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            ffmpeg::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|e| fail("create ffmpeg scaler", e))?;

        log::debug!(
            "ffmpeg encoder ready: {} {}x{} @ {} fps",
            path.display(),
            width,
            height,
            fps
        );

        Ok(Self {
            path: path.to_path_buf(),
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            width,
            height,
            next_pts: 0,
        })
    }

    fn error(&self, stage: &str, e: ffmpeg::Error) -> PipelineError {
        PipelineError::sink_write(&self.path, format!("{}: {}", stage, e))
    }

    fn drain_packets(&mut self) -> Result<(), PipelineError> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| self.error("write packet", e))?;
        }
        Ok(())
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn write_frame(&mut self, rgb: &[u8]) -> Result<(), PipelineError> {
        let row_bytes = self.width as usize * 3;
        if rgb.len() != row_bytes * self.height as usize {
            return Err(PipelineError::sink_write(
                &self.path,
                format!(
                    "expected {} RGB bytes, received {}",
                    row_bytes * self.height as usize,
                    rgb.len()
                ),
            ));
        }

        let mut rgb_frame =
            ffmpeg::frame::Video::new(ffmpeg::format::Pixel::RGB24, self.width, self.height);
        let stride = rgb_frame.stride(0);
        let data = rgb_frame.data_mut(0);
        for (row, src) in rgb.chunks_exact(row_bytes).enumerate() {
            data[row * stride..row * stride + row_bytes].copy_from_slice(src);
        }

        let mut yuv_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb_frame, &mut yuv_frame)
            .map_err(|e| self.error("scale frame to YUV", e))?;
        yuv_frame.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&yuv_frame)
            .map_err(|e| self.error("send frame to encoder", e))?;
        self.drain_packets()
    }

    fn finish(mut self: Box<Self>) -> Result<(), PipelineError> {
        self.encoder
            .send_eof()
            .map_err(|e| self.error("flush encoder", e))?;
        self.drain_packets()?;
        self.output
            .write_trailer()
            .map_err(|e| self.error("write container trailer", e))
    }
}
