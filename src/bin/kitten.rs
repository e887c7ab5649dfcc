//! kitten: caption a local image or GIF.
//!
//! `kitten --input in.gif --caption "text" --output out.gif`

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kitten::render::{CaptionConfig, FontSizing};
use kitten::{Kitten, MediaKind};

/// Kitten offline captioner
#[derive(Parser)]
#[command(name = "kitten")]
#[command(version = kitten::PKG_VERSION)]
#[command(about = "Draw a caption onto a local image or GIF")]
struct Args {
    /// Source file. `.gif` files are captioned frame by frame.
    #[arg(short, long)]
    input: PathBuf,

    /// Caption text
    #[arg(short, long)]
    caption: String,

    /// Destination file (JPEG for images, GIF for animations)
    #[arg(short, long)]
    output: PathBuf,

    /// Fixed font size in points instead of one scaled to the width
    #[arg(long)]
    font_size: Option<f32>,

    /// JPEG quality, 1-100
    #[arg(long, default_value_t = kitten::render::DEFAULT_JPEG_QUALITY)]
    jpeg_quality: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut caption = CaptionConfig::new();
    if let Some(points) = args.font_size {
        caption = caption.sizing(FontSizing::Fixed(points));
    }

    let service = Kitten::builder()
        .disable_artifact_cache()
        .caption_config(caption)
        .jpeg_quality(args.jpeg_quality)
        .build()?;

    let kind = kind_for(&args.input);
    let bytes = tokio::fs::read(&args.input).await?;
    let artifact = service.render_bytes(kind, bytes, &args.caption).await?;
    tokio::fs::write(&args.output, artifact.bytes()).await?;

    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        kind = kind.as_str(),
        bytes = artifact.len(),
        "captioned"
    );
    Ok(())
}

fn kind_for(path: &Path) -> MediaKind {
    let is_gif = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gif"));
    if is_gif { MediaKind::Gif } else { MediaKind::Image }
}
