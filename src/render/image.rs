//! Single-frame captioning: fetch, strip metadata, decode, caption, JPEG.

use std::borrow::Cow;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};

use super::blocking;
use super::caption::CaptionRenderer;
use crate::fetch::Fetcher;
use crate::{KittenError, Result};

/// JPEG quality of captioned images.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP1: u8 = 0xE1;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Remove EXIF (APP1) segments from a JPEG stream.
///
/// Non-JPEG input and malformed headers are returned unchanged; the decoder
/// gets to report those. Only the header section before the first scan is
/// rewritten.
pub fn strip_exif(bytes: &[u8]) -> Cow<'_, [u8]> {
    if !bytes.starts_with(&SOI) {
        return Cow::Borrowed(bytes);
    }

    let mut out = Vec::with_capacity(bytes.len());
    out.extend_from_slice(&SOI);
    let mut pos = SOI.len();
    let mut stripped = false;

    loop {
        if pos + 4 > bytes.len() || bytes[pos] != 0xFF {
            return Cow::Borrowed(bytes);
        }
        let marker = bytes[pos + 1];
        if marker == SOS || marker == EOI {
            out.extend_from_slice(&bytes[pos..]);
            break;
        }

        let length = usize::from(u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]));
        let end = pos + 2 + length;
        if length < 2 || end > bytes.len() {
            return Cow::Borrowed(bytes);
        }

        if marker == APP1 && bytes[pos + 4..end].starts_with(EXIF_HEADER) {
            stripped = true;
        } else {
            out.extend_from_slice(&bytes[pos..end]);
        }
        pos = end;
    }

    if stripped {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(bytes)
    }
}

/// Fetch, caption and re-encode still images.
#[derive(Clone)]
pub struct ImagePipeline {
    fetcher: Arc<dyn Fetcher>,
    renderer: CaptionRenderer,
    jpeg_quality: u8,
}

impl ImagePipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, renderer: CaptionRenderer) -> Self {
        Self {
            fetcher,
            renderer,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Set the output JPEG quality (1-100).
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn renderer(&self) -> &CaptionRenderer {
        &self.renderer
    }

    /// Fetch the image at `url` and caption it.
    pub async fn generate(&self, url: &str, caption: &str) -> Result<Vec<u8>> {
        let bytes = self.fetcher.fetch(url).await?;
        self.caption_bytes(bytes, caption).await
    }

    /// Caption an in-memory image. Any format the decoder recognises is
    /// accepted; the output is always JPEG.
    pub async fn caption_bytes(&self, bytes: Vec<u8>, caption: &str) -> Result<Vec<u8>> {
        let renderer = self.renderer.clone();
        let quality = self.jpeg_quality;
        let caption = caption.to_string();
        blocking("image", move || {
            caption_still(&renderer, &bytes, &caption, quality)
        })
        .await
    }
}

fn caption_still(
    renderer: &CaptionRenderer,
    bytes: &[u8],
    caption: &str,
    quality: u8,
) -> Result<Vec<u8>> {
    let source = strip_exif(bytes);
    let decoded = image::load_from_memory(&source).map_err(|e| KittenError::Decode {
        stage: "image",
        message: e.to_string(),
    })?;

    let mut canvas = decoded.to_rgba8();
    renderer.render_onto(&mut canvas, caption)?;

    let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| KittenError::Encode {
            stage: "jpeg",
            message: e.to_string(),
        })?;
    Ok(out)
}
