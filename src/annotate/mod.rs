//! Caption burn-in.
//!
//! One prediction covers a whole window, so every frame of the window gets the
//! same caption, drawn at the same place.

mod font;

use crate::frame::{ClipWindow, Frame};
use crate::infer::Prediction;

use font::{glyph, GLYPH_HEIGHT, GLYPH_WIDTH};

/// Left edge of the caption, in pixels.
pub const CAPTION_X: usize = 30;
/// Bottom edge of the caption text, in pixels.
pub const CAPTION_BASELINE: usize = 50;

const CAPTION_SCALE: usize = 2;
const CAPTION_PADDING: usize = 4;
const TEXT_COLOR: [u8; 3] = [0, 255, 255];
const BOX_COLOR: [u8; 3] = [0, 0, 0];

/// A frame carrying its window's caption in its pixels.
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub prediction: Prediction,
    pub caption: String,
}

impl AnnotatedFrame {
    pub fn id(&self) -> u64 {
        self.frame.id
    }
}

/// Caption text for a prediction, confidence at six decimals.
pub fn caption_for(prediction: &Prediction) -> String {
    format!("{}: {:.6}", prediction.label, prediction.confidence)
}

/// Burn `prediction` into every frame of `window`, keeping frame order.
pub fn annotate(window: ClipWindow, prediction: &Prediction) -> Vec<AnnotatedFrame> {
    let caption = caption_for(prediction);
    window
        .into_frames()
        .into_iter()
        .map(|mut frame| {
            draw_caption(&mut frame, &caption);
            AnnotatedFrame {
                frame,
                prediction: prediction.clone(),
                caption: caption.clone(),
            }
        })
        .collect()
}

fn draw_caption(frame: &mut Frame, text: &str) {
    let width = frame.width as usize;
    let height = frame.height as usize;
    if width == 0 || height == 0 || frame.expected_len() != Some(frame.pixels().len()) {
        return;
    }

    let glyph_h = GLYPH_HEIGHT * CAPTION_SCALE;
    let text_w = text.chars().count() * GLYPH_WIDTH * CAPTION_SCALE;
    let top = CAPTION_BASELINE.saturating_sub(glyph_h);
    let pixels = frame.pixels_mut();

    let box_x0 = CAPTION_X.saturating_sub(CAPTION_PADDING);
    let box_y0 = top.saturating_sub(CAPTION_PADDING);
    for y in box_y0..(CAPTION_BASELINE + CAPTION_PADDING).min(height) {
        for x in box_x0..(CAPTION_X + text_w + CAPTION_PADDING).min(width) {
            set_pixel(pixels, width, x, y, BOX_COLOR);
        }
    }

    for (i, ch) in text.chars().enumerate() {
        let Some(rows) = glyph(ch) else {
            continue;
        };
        let origin_x = CAPTION_X + i * GLYPH_WIDTH * CAPTION_SCALE;
        if origin_x >= width {
            break;
        }
        for (row, &bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if (bits >> (7 - col)) & 1 == 0 {
                    continue;
                }
                for dy in 0..CAPTION_SCALE {
                    for dx in 0..CAPTION_SCALE {
                        let x = origin_x + col * CAPTION_SCALE + dx;
                        let y = top + row * CAPTION_SCALE + dy;
                        if x < width && y < height {
                            set_pixel(pixels, width, x, y, TEXT_COLOR);
                        }
                    }
                }
            }
        }
    }
}

fn set_pixel(data: &mut [u8], width: usize, x: usize, y: usize, color: [u8; 3]) {
    let idx = (y * width + x) * 3;
    if let Some(px) = data.get_mut(idx..idx + 3) {
        px.copy_from_slice(&color);
    }
}
