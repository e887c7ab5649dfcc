//! Caption rendering.
//!
//! - [`font`]: point-size keyed pool of parsed font faces.
//! - [`caption`]: word wrap, layout and rasterisation into a [`TextMask`].
//! - [`composite`]: masked-over blending of a mask onto RGBA pixels.
//! - [`pool`]: bounded fail-fast worker pool used for GIF frames.
//! - [`image`] and [`gif`]: the two fetch → decode → caption → encode
//!   pipelines.
//!
//! Everything CPU-bound runs on tokio's blocking pool; the async entry
//! points only await network I/O and task completion.

pub mod caption;
pub mod composite;
pub mod font;
pub mod gif;
pub mod image;
pub mod pool;

pub use caption::{CaptionConfig, CaptionLayout, CaptionRenderer, FontSizing, TextMask, wrap_words};
pub use font::{EMBEDDED_FONT, FontFace, FontFacePool, FontLease};
pub use self::gif::{Animation, AnimationFrame, DEFAULT_MAX_CANVAS_PIXELS, GifPipeline};
pub use self::image::{DEFAULT_JPEG_QUALITY, ImagePipeline, strip_exif};
pub use pool::{DEFAULT_FRAME_CONCURRENCY, FailFastPool};

use crate::{KittenError, Result};

/// Run CPU-bound work off the async executor. Join failures are reported as
/// a decode failure of `stage`.
pub(crate) async fn blocking<T, F>(stage: &'static str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| KittenError::Decode {
            stage,
            message: format!("worker task failed: {e}"),
        })?
}
