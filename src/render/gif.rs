//! Animated GIF captioning.
//!
//! Frames are decoded to RGBA with their rectangle, delay and disposal
//! intact, the caption mask is rasterised once for the logical canvas, and
//! every frame is composited against that shared mask on a
//! [`FailFastPool`]. Re-encoding quantises each frame to its own palette and
//! writes back the original metadata and loop count.

use std::num::NonZeroU64;
use std::sync::Arc;

use gif::{ColorOutput, DecodeOptions, DisposalMethod, Encoder, Frame, MemoryLimit, Repeat};
use tracing::debug;

use super::caption::{CaptionRenderer, TextMask};
use super::composite;
use super::blocking;
use super::pool::FailFastPool;
use crate::fetch::Fetcher;
use crate::{KittenError, Result};

/// NeuQuant sampling factor used when re-quantising frames (1 = best, 30 = fastest).
const QUANTIZE_SPEED: i32 = 10;

/// Largest logical screen accepted by [`Animation::decode`], in pixels.
pub const DEFAULT_MAX_CANVAS_PIXELS: u64 = 4096 * 4096;

/// One decoded frame: its rectangle on the canvas plus RGBA pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationFrame {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    /// Delay in hundredths of a second.
    pub delay: u16,
    pub dispose: DisposalMethod,
    /// Straight-alpha RGBA, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

/// A decoded animation.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    pub width: u16,
    pub height: u16,
    pub repeat: Repeat,
    pub frames: Vec<AnimationFrame>,
}

impl Animation {
    /// Decode with the default canvas budget of [`DEFAULT_MAX_CANVAS_PIXELS`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_within(bytes, DEFAULT_MAX_CANVAS_PIXELS)
    }

    /// Decode, rejecting any screen or frame larger than `max_pixels`.
    ///
    /// The screen size is checked before any frame is read, so a tiny file
    /// declaring a huge canvas fails without allocating for it.
    pub fn decode_within(bytes: &[u8], max_pixels: u64) -> Result<Self> {
        let mut options = DecodeOptions::new();
        options.set_color_output(ColorOutput::RGBA);
        if let Some(limit) = NonZeroU64::new(max_pixels.saturating_mul(4)) {
            options.set_memory_limit(MemoryLimit::Bytes(limit));
        }
        let mut decoder = options.read_info(bytes).map_err(decode_error)?;

        let width = decoder.width();
        let height = decoder.height();
        let pixels = u64::from(width) * u64::from(height);
        if pixels > max_pixels {
            return Err(KittenError::Decode {
                stage: "gif",
                message: format!("canvas {width}x{height} exceeds {max_pixels} pixels"),
            });
        }

        let mut frames = Vec::new();
        while let Some(frame) = decoder.read_next_frame().map_err(decode_error)? {
            frames.push(AnimationFrame {
                left: frame.left,
                top: frame.top,
                width: frame.width,
                height: frame.height,
                delay: frame.delay,
                dispose: frame.dispose,
                rgba: frame.buffer.to_vec(),
            });
        }

        if frames.is_empty() {
            return Err(KittenError::Decode {
                stage: "gif",
                message: "animation has no frames".to_string(),
            });
        }

        Ok(Self {
            width,
            height,
            repeat: decoder.repeat(),
            frames,
        })
    }

    pub fn encode(self) -> Result<Vec<u8>> {
        let mut encoder =
            Encoder::new(Vec::new(), self.width, self.height, &[]).map_err(encode_error)?;
        encoder.set_repeat(self.repeat).map_err(encode_error)?;

        for (index, mut source) in self.frames.into_iter().enumerate() {
            let expected = usize::from(source.width) * usize::from(source.height) * 4;
            if source.rgba.len() != expected {
                return Err(KittenError::Encode {
                    stage: "gif",
                    message: format!(
                        "frame {index} holds {} bytes, expected {expected}",
                        source.rgba.len()
                    ),
                });
            }

            let mut frame = Frame::from_rgba_speed(
                source.width,
                source.height,
                &mut source.rgba,
                QUANTIZE_SPEED,
            );
            frame.left = source.left;
            frame.top = source.top;
            frame.delay = source.delay;
            frame.dispose = source.dispose;
            encoder.write_frame(&frame).map_err(encode_error)?;
        }

        encoder
            .into_inner()
            .map_err(|e| KittenError::Encode {
                stage: "gif",
                message: e.to_string(),
            })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

fn decode_error(err: gif::DecodingError) -> KittenError {
    KittenError::Decode {
        stage: "gif",
        message: err.to_string(),
    }
}

fn encode_error(err: gif::EncodingError) -> KittenError {
    KittenError::Encode {
        stage: "gif",
        message: err.to_string(),
    }
}

/// Fetch, decode, caption and re-encode animated GIFs.
#[derive(Clone)]
pub struct GifPipeline {
    fetcher: Arc<dyn Fetcher>,
    renderer: CaptionRenderer,
    pool: FailFastPool,
    max_canvas_pixels: u64,
}

impl GifPipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, renderer: CaptionRenderer, pool: FailFastPool) -> Self {
        Self {
            fetcher,
            renderer,
            pool,
            max_canvas_pixels: DEFAULT_MAX_CANVAS_PIXELS,
        }
    }

    /// Largest logical screen to decode. Default: 4096 x 4096.
    pub fn max_canvas_pixels(mut self, pixels: u64) -> Self {
        self.max_canvas_pixels = pixels;
        self
    }

    pub fn renderer(&self) -> &CaptionRenderer {
        &self.renderer
    }

    /// Fetch the GIF at `url` and caption every frame.
    pub async fn generate(&self, url: &str, caption: &str) -> Result<Vec<u8>> {
        let bytes = self.fetcher.fetch(url).await?;
        self.caption_bytes(bytes, caption).await
    }

    /// Caption an in-memory GIF.
    pub async fn caption_bytes(&self, bytes: Vec<u8>, caption: &str) -> Result<Vec<u8>> {
        let limit = self.max_canvas_pixels;
        let animation = blocking("gif", move || Animation::decode_within(&bytes, limit)).await?;
        let animation = self.caption_animation(animation, caption).await?;
        blocking("gif", move || animation.encode()).await
    }

    /// Composite the caption onto every frame of an already decoded
    /// animation. Fails as a whole if any frame fails.
    pub async fn caption_animation(&self, animation: Animation, caption: &str) -> Result<Animation> {
        let Animation {
            width,
            height,
            repeat,
            frames,
        } = animation;

        let renderer = self.renderer.clone();
        let text = caption.to_string();
        let mask: Arc<TextMask> = blocking("caption", move || {
            renderer
                .render_mask(u32::from(width), u32::from(height), &text)
                .map(Arc::new)
        })
        .await?;

        debug!(
            frames = frames.len(),
            width,
            height,
            workers = self.pool.limit(),
            "compositing gif frames"
        );

        let frames = self
            .pool
            .run(frames, move |index, frame: &mut AnimationFrame| {
                composite::mask_over(
                    &mut frame.rgba,
                    u32::from(frame.left),
                    u32::from(frame.top),
                    u32::from(frame.width),
                    u32::from(frame.height),
                    &mask,
                )
                .map_err(|e| KittenError::FrameTask {
                    index,
                    message: e.to_string(),
                })
            })
            .await?;

        Ok(Animation {
            width,
            height,
            repeat,
            frames,
        })
    }
}
