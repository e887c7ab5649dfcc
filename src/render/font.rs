//! Font faces pooled per point size.
//!
//! A [`FontFace`] owns the parsed font plus a per-size cache of glyph
//! outlines already scaled to pixels, so reusing a face across renders skips
//! both parsing and outline extraction. Faces are leased from a
//! [`FontFacePool`] and returned automatically when the [`FontLease`] drops,
//! which keeps borrow/return balanced even on early returns.
//!
//! Sizes are in points at 72 DPI, i.e. one point is one pixel.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use tiny_skia::{FillRule, Paint, Path, PathBuilder, Pixmap, Transform};
use tracing::debug;

use crate::{KittenError, Result};

/// Bold condensed sans face bundled with the crate.
pub static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSansCondensed-Bold.ttf");

/// Converts ttf-parser outlines (font units, y-up) into a tiny-skia path.
struct OutlineBuilder(PathBuilder);

impl ttf_parser::OutlineBuilder for OutlineBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.0.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.0.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.0.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.0.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.0.close();
    }
}

/// A glyph scaled to the face's point size, origin on the baseline, y-down.
#[derive(Clone)]
struct Glyph {
    path: Option<Path>,
    advance: f32,
}

/// A font face bound to one point size.
pub struct FontFace {
    face: ttf_parser::Face<'static>,
    point_size: f32,
    scale: f32,
    glyphs: HashMap<char, Glyph>,
}

impl FontFace {
    /// Parse `data` and bind it to `point_size`.
    pub fn load(data: &'static [u8], point_size: f32) -> Result<Self> {
        if !point_size.is_finite() || point_size <= 0.0 {
            return Err(KittenError::Font(format!(
                "invalid point size {point_size}"
            )));
        }

        let face = ttf_parser::Face::parse(data, 0)
            .map_err(|e| KittenError::Font(format!("parse font: {e}")))?;
        let scale = point_size / f32::from(face.units_per_em());

        Ok(Self {
            face,
            point_size,
            scale,
            glyphs: HashMap::new(),
        })
    }

    pub fn point_size(&self) -> f32 {
        self.point_size
    }

    /// Distance from the baseline to the top of capital letters, in pixels.
    pub fn cap_height(&self) -> f32 {
        let units = self
            .face
            .capital_height()
            .unwrap_or_else(|| self.face.ascender());
        f32::from(units) * self.scale
    }

    /// Horizontal advance of `text`, in pixels.
    pub fn measure(&mut self, text: &str) -> f32 {
        text.chars().map(|c| self.glyph(c).advance).sum()
    }

    /// Fill `text` with its baseline starting at `(x, baseline)`.
    pub fn draw(&mut self, pixmap: &mut Pixmap, text: &str, x: f32, baseline: f32, paint: &Paint) {
        let mut pen = x;
        for c in text.chars() {
            let glyph = self.glyph(c);
            if let Some(path) = &glyph.path {
                pixmap.fill_path(
                    path,
                    paint,
                    FillRule::Winding,
                    Transform::from_translate(pen, baseline),
                    None,
                );
            }
            pen += glyph.advance;
        }
    }

    fn glyph(&mut self, c: char) -> Glyph {
        if let Some(glyph) = self.glyphs.get(&c) {
            return glyph.clone();
        }

        let glyph = match self.face.glyph_index(c) {
            Some(id) => {
                let mut builder = OutlineBuilder(PathBuilder::new());
                let path = self
                    .face
                    .outline_glyph(id, &mut builder)
                    .and_then(|_| builder.0.finish())
                    .and_then(|p| p.transform(Transform::from_scale(self.scale, -self.scale)));
                let advance = self
                    .face
                    .glyph_hor_advance(id)
                    .map(|a| f32::from(a) * self.scale)
                    .unwrap_or(0.0);
                Glyph { path, advance }
            }
            // Unmapped characters render as blank space one third of an em wide.
            None => Glyph {
                path: None,
                advance: self.point_size / 3.0,
            },
        };

        self.glyphs.insert(c, glyph.clone());
        glyph
    }
}

/// Pool of [`FontFace`]s keyed by point size.
///
/// The first acquisition of a size parses the font; later acquisitions reuse
/// an idle face or parse a fresh one when every face of that size is leased.
/// The pool has no upper bound: a lease that is never returned only costs a
/// future re-parse.
pub struct FontFacePool {
    data: &'static [u8],
    idle: Mutex<HashMap<u32, Vec<FontFace>>>,
}

impl FontFacePool {
    /// Pool over the bundled font.
    pub fn embedded() -> Result<Self> {
        Self::from_static(EMBEDDED_FONT)
    }

    /// Pool over caller-provided font bytes. Fails if the bytes do not parse.
    pub fn from_static(data: &'static [u8]) -> Result<Self> {
        ttf_parser::Face::parse(data, 0)
            .map_err(|e| KittenError::Font(format!("parse font: {e}")))?;
        Ok(Self {
            data,
            idle: Mutex::new(HashMap::new()),
        })
    }

    /// Lease a face for `point_size`.
    pub fn acquire(&self, point_size: f32) -> Result<FontLease<'_>> {
        let key = size_key(point_size);
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&key)
            .and_then(Vec::pop);

        let face = match pooled {
            Some(face) => face,
            None => {
                debug!(point_size, "allocating font face");
                FontFace::load(self.data, point_size)?
            }
        };

        Ok(FontLease {
            pool: self,
            key,
            face: Some(face),
        })
    }

    /// Number of idle faces pooled for `point_size`.
    pub fn idle_count(&self, point_size: f32) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&size_key(point_size))
            .map_or(0, Vec::len)
    }

    fn release(&self, key: u32, face: FontFace) {
        self.idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key)
            .or_default()
            .push(face);
    }
}

/// Sizes are pooled at 1/64 point granularity.
fn size_key(point_size: f32) -> u32 {
    (point_size * 64.0).round().max(0.0) as u32
}

/// Exclusive lease on a pooled [`FontFace`]; returns it to the pool on drop.
pub struct FontLease<'a> {
    pool: &'a FontFacePool,
    key: u32,
    face: Option<FontFace>,
}

impl Deref for FontLease<'_> {
    type Target = FontFace;

    fn deref(&self) -> &FontFace {
        // Only `drop` takes the face out.
        self.face.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for FontLease<'_> {
    fn deref_mut(&mut self) -> &mut FontFace {
        self.face.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for FontLease<'_> {
    fn drop(&mut self) {
        if let Some(face) = self.face.take() {
            self.pool.release(self.key, face);
        }
    }
}
