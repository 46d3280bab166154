//! Local file frame source using FFmpeg.
//!
//! Decodes the best video stream of a local container and converts every
//! picture to packed RGB24 at its native resolution. Frames still queued in the
//! decoder when the demuxer runs dry are flushed before end-of-stream.

use std::path::Path;

use ffmpeg_next as ffmpeg;

use super::file::DecodedPicture;

pub(crate) struct FfmpegFileSource {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &Path) -> Result<Self, String> {
        ffmpeg::init().map_err(|e| format!("initialize ffmpeg: {}", e))?;
        let input = ffmpeg::format::input(&path)
            .map_err(|e| format!("failed to open file input with ffmpeg: {}", e))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| "file has no video track".to_string())?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .map_err(|e| format!("load video decoder parameters: {}", e))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| format!("open ffmpeg video decoder: {}", e))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|e| format!("create ffmpeg scaler: {}", e))?;

        log::info!(
            "FileSource: connected to {} (ffmpeg, {}x{})",
            path.display(),
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            eof_sent: false,
        })
    }

    pub(crate) fn next_picture(&mut self) -> Result<Option<DecodedPicture>, String> {
        let mut decoded = ffmpeg::frame::Video::empty();

        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }

            let mut fed = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                self.decoder
                    .send_packet(&packet)
                    .map_err(|e| format!("send packet to ffmpeg decoder: {}", e))?;
                fed = true;
                break;
            }

            if !fed {
                self.decoder
                    .send_eof()
                    .map_err(|e| format!("flush ffmpeg decoder: {}", e))?;
                self.eof_sent = true;
            }
        }
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<DecodedPicture, String> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .map_err(|e| format!("scale frame to RGB: {}", e))?;
        frame_to_pixels(&rgb_frame)
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<DecodedPicture, String> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok(DecodedPicture {
            width,
            height,
            pixels: data
                .get(..row_bytes * height as usize)
                .ok_or_else(|| "ffmpeg frame is shorter than its dimensions".to_string())?
                .to_vec(),
        });
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .ok_or_else(|| "ffmpeg frame row is out of bounds".to_string())?,
        );
    }

    Ok(DecodedPicture {
        width,
        height,
        pixels,
    })
}
