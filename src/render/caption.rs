//! Caption layout and rasterisation.
//!
//! Captions are drawn meme-style: uppercase, word-wrapped, centred
//! horizontally, stacked from the top, white glyphs over a black outline.
//! The outline is produced by stamping the glyphs in black at every pixel
//! offset of a square around the anchor before drawing them once in white.
//!
//! Rendering is deterministic: the same `(width, height, text)` and the same
//! font bytes always produce identical pixels, which both cache tiers rely on.

use std::sync::Arc;

use image::RgbaImage;
use tiny_skia::{Paint, Pixmap};

use super::composite;
use super::font::{FontFace, FontFacePool};
use crate::{KittenError, Result};

/// How the caption point size is derived from the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FontSizing {
    /// A fraction of the canvas width.
    Proportional(f32),
    /// A constant size regardless of the canvas.
    Fixed(f32),
}

impl FontSizing {
    /// Point size for a canvas `width` pixels wide.
    pub fn point_size(&self, width: u32) -> f32 {
        match *self {
            FontSizing::Proportional(ratio) => width as f32 * ratio,
            FontSizing::Fixed(points) => points,
        }
    }
}

impl Default for FontSizing {
    fn default() -> Self {
        FontSizing::Proportional(0.07)
    }
}

/// Configuration for caption rendering.
///
/// ```rust
/// # use kitten::render::{CaptionConfig, FontSizing};
/// let config = CaptionConfig::new()
///     .sizing(FontSizing::Fixed(48.0))
///     .wrap_ratio(0.75);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionConfig {
    /// Point size rule. Default: 7% of the canvas width.
    pub sizing: FontSizing,
    /// Maximum line width as a fraction of the canvas width. Default: 0.8.
    pub wrap_ratio: f32,
    /// Outline thickness in pixels on each side of the glyphs. Default: 2.
    pub outline_radius: u8,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            sizing: FontSizing::default(),
            wrap_ratio: 0.8,
            outline_radius: 2,
        }
    }
}

impl CaptionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sizing(mut self, sizing: FontSizing) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn wrap_ratio(mut self, ratio: f32) -> Self {
        self.wrap_ratio = ratio;
        self
    }

    pub fn outline_radius(mut self, radius: u8) -> Self {
        self.outline_radius = radius;
        self
    }
}

/// Rendered caption over a transparent canvas, premultiplied RGBA.
///
/// Built once per request and read-only afterwards; GIF frames share one
/// instance across compositing tasks.
pub struct TextMask {
    pixmap: Pixmap,
}

impl TextMask {
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Premultiplied RGBA bytes, row-major.
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Premultiplied RGBA value at `(x, y)`, or `None` outside the mask.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let i = (y as usize * self.width() as usize + x as usize) * 4;
        let d = self.data();
        Some([d[i], d[i + 1], d[i + 2], d[i + 3]])
    }

    /// Whether no pixel is covered.
    pub fn is_blank(&self) -> bool {
        self.data().chunks_exact(4).all(|px| px[3] == 0)
    }
}

/// Lines and metrics of a laid-out caption.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionLayout {
    pub point_size: f32,
    pub lines: Vec<String>,
}

/// Greedy word wrap: words are added to the current line while it fits in
/// `max_width`. A single word wider than `max_width` gets a line of its own
/// rather than being split. Explicit newlines always break.
pub fn wrap_words(text: &str, max_width: f32, mut measure: impl FnMut(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if line.is_empty() {
                line.push_str(word);
                continue;
            }
            let candidate = format!("{line} {word}");
            if measure(&candidate) > max_width {
                lines.push(std::mem::take(&mut line));
                line.push_str(word);
            } else {
                line = candidate;
            }
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

/// Lays out and rasterises captions using faces leased from a shared pool.
#[derive(Clone)]
pub struct CaptionRenderer {
    fonts: Arc<FontFacePool>,
    config: CaptionConfig,
}

impl CaptionRenderer {
    pub fn new(fonts: Arc<FontFacePool>, config: CaptionConfig) -> Self {
        Self { fonts, config }
    }

    pub fn config(&self) -> &CaptionConfig {
        &self.config
    }

    /// Same font pool, different configuration.
    pub fn with_config(&self, config: CaptionConfig) -> Self {
        Self {
            fonts: Arc::clone(&self.fonts),
            config,
        }
    }

    /// Wrap `text` for a canvas `width` pixels wide.
    pub fn layout(&self, width: u32, text: &str) -> Result<CaptionLayout> {
        let point_size = self.config.sizing.point_size(width);
        let mut face = self.fonts.acquire(point_size)?;
        let lines = self.wrap(&mut face, width, text);
        Ok(CaptionLayout { point_size, lines })
    }

    /// Render `text` into a mask of exactly `width` x `height` pixels.
    pub fn render_mask(&self, width: u32, height: u32, text: &str) -> Result<TextMask> {
        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| KittenError::Decode {
            stage: "caption",
            message: format!("invalid canvas size {width}x{height}"),
        })?;

        let point_size = self.config.sizing.point_size(width);
        let mut face = self.fonts.acquire(point_size)?;
        let lines = self.wrap(&mut face, width, text);

        let mut outline = Paint::default();
        outline.set_color_rgba8(0, 0, 0, 255);
        outline.anti_alias = true;
        let mut fill = Paint::default();
        fill.set_color_rgba8(255, 255, 255, 255);
        fill.anti_alias = true;

        let radius = i32::from(self.config.outline_radius);
        let x_anchor = (width / 2) as f32;
        let mut y_anchor = point_size / 2.0;

        for line in &lines {
            y_anchor += point_size;

            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    draw_centered(
                        &mut face,
                        &mut pixmap,
                        line,
                        x_anchor + dx as f32,
                        y_anchor + dy as f32,
                        &outline,
                    );
                }
            }
            draw_centered(&mut face, &mut pixmap, line, x_anchor, y_anchor, &fill);
        }

        Ok(TextMask { pixmap })
    }

    /// Render `text` directly onto `image`.
    pub fn render_onto(&self, image: &mut RgbaImage, text: &str) -> Result<()> {
        let (width, height) = image.dimensions();
        let mask = self.render_mask(width, height, text)?;
        composite::mask_over(image.as_mut(), 0, 0, width, height, &mask)
    }

    fn wrap(&self, face: &mut FontFace, width: u32, text: &str) -> Vec<String> {
        let max_width = width as f32 * self.config.wrap_ratio;
        wrap_words(&text.to_uppercase(), max_width, |s| face.measure(s))
    }
}

/// Draw `line` so that its horizontal centre and its cap-height centre sit
/// on `(x, y)`.
fn draw_centered(face: &mut FontFace, pixmap: &mut Pixmap, line: &str, x: f32, y: f32, paint: &Paint) {
    let width = face.measure(line);
    let baseline = y + face.cap_height() / 2.0;
    face.draw(pixmap, line, x - width / 2.0, baseline, paint);
}
