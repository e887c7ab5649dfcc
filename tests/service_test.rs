//! End-to-end tests for `CaptionService` with mock resolvers and fetchers.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};

use kitten::cache::CacheKey;
use kitten::fetch::Fetcher;
use kitten::providers::SubjectResolver;
use kitten::render::{Animation, AnimationFrame};
use kitten::types::{SearchHit, SubjectMetadata};
use kitten::{CaptionRequest, CaptionService, Kitten, KittenError, MediaKind, Result};

// ============================================================================
// Mocks
// ============================================================================

#[derive(Default)]
struct CountingResolver {
    resolves: AtomicUsize,
    searches: AtomicUsize,
    notifications: AtomicUsize,
}

#[async_trait]
impl SubjectResolver for CountingResolver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn resolve(&self, id: &str) -> Result<SubjectMetadata> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if id == "missing" {
            return Err(KittenError::NotFound(format!("subject `{id}`")));
        }
        Ok(SubjectMetadata::new(id, format!("https://media.example.com/{id}")))
    }

    async fn search(&self, query: &str, cursor: Option<&str>) -> Result<SearchHit> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if query == "nothing" {
            return Err(KittenError::NotFound(format!("search `{query}`")));
        }
        let page: u32 = cursor.map_or(0, |c| c.parse().unwrap());
        let id = format!("{query}-{page}");
        Ok(
            SearchHit::new(SubjectMetadata::new(&id, format!("https://media.example.com/{id}")))
                .with_next((page + 1).to_string()),
        )
    }

    async fn notify_used(&self, _subject: &SubjectMetadata, _search: Option<&str>) -> Result<()> {
        self.notifications.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct CountingFetcher {
    body: Vec<u8>,
    calls: AtomicUsize,
}

impl CountingFetcher {
    fn new(body: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            body,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.clone())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 90, 255])
    });
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn gif(frames: usize) -> Vec<u8> {
    Animation {
        width: 64,
        height: 48,
        repeat: gif::Repeat::Infinite,
        frames: (0..frames)
            .map(|i| AnimationFrame {
                left: 0,
                top: 0,
                width: 64,
                height: 48,
                delay: 4 + i as u16,
                dispose: gif::DisposalMethod::Any,
                rgba: [(i * 40) as u8, 100, 150, 255].repeat(64 * 48),
            })
            .collect(),
    }
    .encode()
    .unwrap()
}

struct Harness {
    service: CaptionService,
    resolver: Arc<CountingResolver>,
    fetcher: Arc<CountingFetcher>,
    _dir: tempfile::TempDir,
}

fn harness(body: Vec<u8>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Arc::new(CountingResolver::default());
    let fetcher = CountingFetcher::new(body);
    let service = Kitten::builder()
        .artifact_dir(dir.path())
        .image_resolver(Arc::clone(&resolver) as Arc<dyn SubjectResolver>)
        .gif_resolver(Arc::clone(&resolver) as Arc<dyn SubjectResolver>)
        .fetcher(Arc::clone(&fetcher) as Arc<dyn Fetcher>)
        .build()
        .unwrap();
    Harness {
        service,
        resolver,
        fetcher,
        _dir: dir,
    }
}

/// Wait for the detached artifact store to land on disk.
async fn wait_for_file(path: &Path) {
    for _ in 0..200 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} was never written", path.display());
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn second_identical_request_is_served_from_disk() {
    let h = harness(png(320, 240));
    let request = CaptionRequest::new("abc123", "hello world", MediaKind::Image).unwrap();

    let first = h.service.render(&request).await.unwrap();
    assert_eq!(first.content_type(), "image/jpeg");
    assert_eq!(&first.bytes()[..2], &[0xFF, 0xD8]);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.resolver.resolves.load(Ordering::SeqCst), 1);

    let cache = h.service.artifact_cache().unwrap();
    wait_for_file(&cache.path_for(&CacheKey::for_request(&request))).await;

    let second = h.service.render(&request).await.unwrap();
    assert_eq!(second.bytes(), first.bytes());
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.resolver.resolves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn independent_renders_are_identical() {
    let a = harness(png(200, 100));
    let b = harness(png(200, 100));
    let request = CaptionRequest::new("same", "same words", MediaKind::Image).unwrap();

    let first = a.service.render(&request).await.unwrap();
    let second = b.service.render(&request).await.unwrap();
    assert_eq!(first, second);
}

#[test]
fn empty_caption_is_rejected_before_any_fetch() {
    let err = CaptionRequest::new("xyz", "", MediaKind::Image).unwrap_err();
    assert!(matches!(err, KittenError::BadInput(_)));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn render_bytes_rejects_empty_caption() {
    let h = harness(Vec::new());
    let err = h
        .service
        .render_bytes(MediaKind::Image, png(10, 10), "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, KittenError::BadInput(_)));
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn gif_requests_keep_every_frame() {
    let h = harness(gif(6));
    let request = CaptionRequest::new("dance", "TEST", MediaKind::Gif).unwrap();

    let artifact = h.service.render(&request).await.unwrap();
    assert_eq!(artifact.content_type(), "image/gif");

    let decoded = Animation::decode(artifact.bytes()).unwrap();
    let delays: Vec<u16> = decoded.frames.iter().map(|f| f.delay).collect();
    assert_eq!(delays, vec![4, 5, 6, 7, 8, 9]);
}

#[tokio::test]
async fn subject_metadata_is_cached_across_captions() {
    let h = harness(png(64, 64));
    for caption in ["one", "two", "three"] {
        let request = CaptionRequest::new("abc123", caption, MediaKind::Image).unwrap();
        h.service.render(&request).await.unwrap();
    }
    assert_eq!(h.resolver.resolves.load(Ordering::SeqCst), 1);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn usage_is_reported_for_rendered_subjects() {
    let h = harness(png(64, 64));
    let request = CaptionRequest::new("abc123", "hi", MediaKind::Image)
        .unwrap()
        .with_search("cats");
    h.service.render(&request).await.unwrap();

    for _ in 0..100 {
        if h.resolver.notifications.load(Ordering::SeqCst) == 1 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("usage notification was never sent");
}

#[tokio::test]
async fn upstream_not_found_propagates() {
    let h = harness(png(64, 64));
    let request = CaptionRequest::new("missing", "hi", MediaKind::Image).unwrap();
    let err = h.service.render(&request).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_provider_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let service = Kitten::builder()
        .artifact_dir(dir.path())
        .fetcher(CountingFetcher::new(png(8, 8)))
        .build()
        .unwrap();

    let request = CaptionRequest::new("abc", "hi", MediaKind::Gif).unwrap();
    let err = service.render(&request).await.unwrap_err();
    assert!(matches!(err, KittenError::Configuration(_)));
}

#[tokio::test]
async fn render_url_skips_resolution() {
    let h = harness(png(100, 80));
    let artifact = h
        .service
        .render_url(MediaKind::Image, "https://cdn.example.com/a.png", "direct")
        .await
        .unwrap();

    assert_eq!(artifact.kind(), MediaKind::Image);
    assert_eq!(h.resolver.resolves.load(Ordering::SeqCst), 0);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disabled_artifact_cache_always_renders() {
    let fetcher = CountingFetcher::new(png(64, 64));
    let service = Kitten::builder()
        .disable_artifact_cache()
        .image_resolver(Arc::new(CountingResolver::default()))
        .fetcher(Arc::clone(&fetcher) as Arc<dyn Fetcher>)
        .build()
        .unwrap();
    assert!(service.artifact_cache().is_none());

    let request = CaptionRequest::new("abc", "hi", MediaKind::Image).unwrap();
    service.render(&request).await.unwrap();
    service.render(&request).await.unwrap();
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cache_control_reflects_ttl() {
    let service = Kitten::builder()
        .disable_artifact_cache()
        .cache_ttl(Duration::from_secs(60))
        .build()
        .unwrap();
    assert_eq!(service.cache_control(), "public, max-age=60");
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn search_hit_is_cached_for_later_renders() {
    let h = harness(png(120, 90));
    let outcome = h
        .service
        .search(MediaKind::Image, "cats", None, "hello")
        .await
        .unwrap();

    assert_eq!(outcome.hit.subject.id, "cats-0");
    assert_eq!(outcome.hit.next.as_deref(), Some("1"));
    assert_eq!(outcome.artifact.content_type(), "image/jpeg");
    assert_eq!(h.resolver.searches.load(Ordering::SeqCst), 1);
    assert_eq!(h.resolver.resolves.load(Ordering::SeqCst), 0);

    // The hit went into the subject cache, so a render by id skips the provider.
    let request = CaptionRequest::new("cats-0", "another caption", MediaKind::Image).unwrap();
    h.service.render(&request).await.unwrap();
    assert_eq!(h.resolver.resolves.load(Ordering::SeqCst), 0);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn search_artifact_is_keyed_by_query() {
    let h = harness(gif(2));
    let outcome = h
        .service
        .search(MediaKind::Gif, "party", Some("3"), "TEST")
        .await
        .unwrap();
    assert_eq!(outcome.hit.subject.id, "party-3");
    assert_eq!(outcome.artifact.content_type(), "image/gif");

    let request = CaptionRequest::new("party-3", "TEST", MediaKind::Gif)
        .unwrap()
        .with_search("party");
    let cache = h.service.artifact_cache().unwrap();
    wait_for_file(&cache.path_for(&CacheKey::for_request(&request))).await;
}

#[tokio::test]
async fn search_rejects_empty_input_before_the_provider() {
    let h = harness(png(8, 8));
    for (query, caption) in [("  ", "hi"), ("cats", "")] {
        let err = h
            .service
            .search(MediaKind::Image, query, None, caption)
            .await
            .unwrap_err();
        assert!(matches!(err, KittenError::BadInput(_)));
    }
    assert_eq!(h.resolver.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn search_without_results_is_not_found() {
    let h = harness(png(8, 8));
    let err = h
        .service
        .search(MediaKind::Image, "nothing", None, "hi")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
}
