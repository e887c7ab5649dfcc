//! Tests for the still image pipeline with in-test fixtures.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};

use kitten::fetch::Fetcher;
use kitten::render::{CaptionConfig, CaptionRenderer, FontFacePool, ImagePipeline};
use kitten::{KittenError, Result};

struct StaticFetcher(Vec<u8>);

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

fn encode(image: &RgbaImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    match format {
        // JPEG has no alpha channel.
        ImageFormat::Jpeg => image::DynamicImage::ImageRgba8(image.clone())
            .to_rgb8()
            .write_to(&mut out, format)
            .unwrap(),
        _ => image.write_to(&mut out, format).unwrap(),
    }
    out.into_inner()
}

fn sky(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 180, 255])
    })
}

fn pipeline(source: Vec<u8>) -> ImagePipeline {
    let renderer = CaptionRenderer::new(
        Arc::new(FontFacePool::embedded().unwrap()),
        CaptionConfig::default(),
    );
    ImagePipeline::new(Arc::new(StaticFetcher(source)), renderer)
}

#[tokio::test]
async fn png_in_jpeg_out() {
    let source = encode(&sky(320, 200), ImageFormat::Png);
    let output = pipeline(source.clone())
        .caption_bytes(source, "hello world")
        .await
        .unwrap();

    assert_eq!(&output[..2], &[0xFF, 0xD8]);
    let decoded = image::load_from_memory_with_format(&output, ImageFormat::Jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (320, 200));
}

#[tokio::test]
async fn generate_captions_fetched_jpeg() {
    let source = encode(&sky(200, 150), ImageFormat::Jpeg);
    let output = pipeline(source)
        .generate("https://images.example.com/abc123", "hello")
        .await
        .unwrap();

    let decoded = image::load_from_memory(&output).unwrap().to_rgb8();
    assert_eq!(decoded.dimensions(), (200, 150));
}

#[tokio::test]
async fn output_is_deterministic() {
    let source = encode(&sky(240, 160), ImageFormat::Png);
    let pipeline = pipeline(Vec::new());

    let a = pipeline.caption_bytes(source.clone(), "same").await.unwrap();
    let b = pipeline.caption_bytes(source, "same").await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn caption_changes_the_pixels() {
    let source = encode(&sky(240, 160), ImageFormat::Png);
    let pipeline = pipeline(Vec::new());

    let plain = pipeline.caption_bytes(source.clone(), " ").await.unwrap();
    let captioned = pipeline.caption_bytes(source, "CAPTION").await.unwrap();
    assert_ne!(plain, captioned);
}

#[tokio::test]
async fn lower_quality_is_smaller() {
    let source = encode(&sky(320, 240), ImageFormat::Png);
    let best = pipeline(Vec::new())
        .jpeg_quality(100)
        .caption_bytes(source.clone(), "size")
        .await
        .unwrap();
    let rough = pipeline(Vec::new())
        .jpeg_quality(10)
        .caption_bytes(source, "size")
        .await
        .unwrap();
    assert!(rough.len() < best.len());
}

#[tokio::test]
async fn undecodable_input_is_a_decode_error() {
    let err = pipeline(Vec::new())
        .caption_bytes(b"not an image".to_vec(), "x")
        .await
        .unwrap_err();
    assert!(matches!(err, KittenError::Decode { stage: "image", .. }));
}

#[tokio::test]
async fn exif_payload_does_not_break_decoding() {
    let jpeg = encode(&sky(64, 64), ImageFormat::Jpeg);

    // Splice an APP1/Exif segment in right after SOI.
    let payload = b"Exif\0\0II*\0\x08\0\0\0\0\0";
    let mut with_exif = jpeg[..2].to_vec();
    with_exif.extend([0xFF, 0xE1]);
    with_exif.extend(((payload.len() + 2) as u16).to_be_bytes());
    with_exif.extend(payload);
    with_exif.extend(&jpeg[2..]);

    assert_eq!(kitten::render::strip_exif(&with_exif).as_ref(), jpeg.as_slice());

    let output = pipeline(Vec::new())
        .caption_bytes(with_exif, "exif")
        .await
        .unwrap();
    assert_eq!(image::load_from_memory(&output).unwrap().width(), 64);
}
