//! Builder for configuring service instances

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{CaptionService, SubjectSource};
use crate::Result;
use crate::cache::{ArtifactCache, MemoryStore, RemoteCache, RemoteCacheConfig, RemoteStore};
use crate::fetch::{FetchConfig, Fetcher, HttpFetcher};
use crate::providers::{SubjectResolver, TenorClient, UnsplashClient};
use crate::render::{
    CaptionConfig, CaptionRenderer, DEFAULT_FRAME_CONCURRENCY, DEFAULT_JPEG_QUALITY,
    DEFAULT_MAX_CANVAS_PIXELS, FailFastPool, FontFacePool, GifPipeline, ImagePipeline,
};
use crate::types::DEFAULT_CACHE_TTL;

/// Main entry point for creating service instances.
pub struct Kitten;

impl Kitten {
    /// Create a new builder for configuring the service.
    pub fn builder() -> KittenBuilder {
        KittenBuilder::new()
    }
}

/// Builder for [`CaptionService`].
///
/// Everything has a default: with no calls at all, [`build`](Self::build)
/// yields a service that renders URLs and in-memory media, caches artifacts
/// under [`ArtifactCache::default_dir`] and has no subject providers.
pub struct KittenBuilder {
    artifact_dir: Option<PathBuf>,
    artifact_cache: bool,
    unsplash_key: Option<String>,
    tenor_keys: Option<(String, String)>,
    image_resolver: Option<Arc<dyn SubjectResolver>>,
    gif_resolver: Option<Arc<dyn SubjectResolver>>,
    remote_store: Option<Arc<dyn RemoteStore>>,
    remote_cache: RemoteCacheConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    fetch_config: FetchConfig,
    caption: CaptionConfig,
    gif_caption: Option<CaptionConfig>,
    frame_concurrency: usize,
    jpeg_quality: u8,
    max_gif_pixels: u64,
    fonts: Option<Arc<FontFacePool>>,
    cache_ttl: Duration,
}

impl Default for KittenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KittenBuilder {
    pub fn new() -> Self {
        Self {
            artifact_dir: None,
            artifact_cache: true,
            unsplash_key: None,
            tenor_keys: None,
            image_resolver: None,
            gif_resolver: None,
            remote_store: None,
            remote_cache: RemoteCacheConfig::default(),
            fetcher: None,
            fetch_config: FetchConfig::default(),
            caption: CaptionConfig::default(),
            gif_caption: None,
            frame_concurrency: DEFAULT_FRAME_CONCURRENCY,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_gif_pixels: DEFAULT_MAX_CANVAS_PIXELS,
            fonts: None,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Directory of the artifact cache (default: platform cache dir).
    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    /// Render every request from scratch.
    pub fn disable_artifact_cache(mut self) -> Self {
        self.artifact_cache = false;
        self
    }

    /// Resolve image subjects with Unsplash.
    pub fn unsplash(mut self, access_key: impl Into<String>) -> Self {
        self.unsplash_key = Some(access_key.into());
        self
    }

    /// Resolve GIF subjects with Tenor.
    pub fn tenor(mut self, api_key: impl Into<String>, client_key: impl Into<String>) -> Self {
        self.tenor_keys = Some((api_key.into(), client_key.into()));
        self
    }

    /// Resolve image subjects with a custom resolver. Takes precedence over
    /// [`unsplash`](Self::unsplash).
    pub fn image_resolver(mut self, resolver: Arc<dyn SubjectResolver>) -> Self {
        self.image_resolver = Some(resolver);
        self
    }

    /// Resolve GIF subjects with a custom resolver. Takes precedence over
    /// [`tenor`](Self::tenor).
    pub fn gif_resolver(mut self, resolver: Arc<dyn SubjectResolver>) -> Self {
        self.gif_resolver = Some(resolver);
        self
    }

    /// Backing store of the subject metadata cache (default: in-process).
    pub fn remote_store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.remote_store = Some(store);
        self
    }

    /// Subject cache settings. The namespace is replaced by each provider's name.
    pub fn remote_cache_config(mut self, config: RemoteCacheConfig) -> Self {
        self.remote_cache = config;
        self
    }

    /// Source media fetcher (default: [`HttpFetcher`] built from the fetch config).
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn fetch_config(mut self, config: FetchConfig) -> Self {
        self.fetch_config = config;
        self
    }

    /// Caption settings for both pipelines.
    pub fn caption_config(mut self, config: CaptionConfig) -> Self {
        self.caption = config;
        self
    }

    /// Caption settings for the GIF pipeline only.
    pub fn gif_caption_config(mut self, config: CaptionConfig) -> Self {
        self.gif_caption = Some(config);
        self
    }

    /// Frames composited concurrently per GIF (default: 8).
    pub fn frame_concurrency(mut self, limit: usize) -> Self {
        self.frame_concurrency = limit;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Largest GIF logical screen accepted, in pixels (default: 4096 x 4096).
    pub fn max_gif_pixels(mut self, pixels: u64) -> Self {
        self.max_gif_pixels = pixels;
        self
    }

    /// Share a font pool between services.
    pub fn font_pool(mut self, fonts: Arc<FontFacePool>) -> Self {
        self.fonts = Some(fonts);
        self
    }

    /// Client cache lifetime advertised in `Cache-Control` (default: 7 days).
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Build the service.
    ///
    /// Must be called within a tokio runtime when a client-side remote cache
    /// mirror is configured, so its invalidation listener can start.
    pub fn build(self) -> Result<CaptionService> {
        let fonts = match self.fonts {
            Some(fonts) => fonts,
            None => Arc::new(FontFacePool::embedded()?),
        };
        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(&self.fetch_config)?),
        };

        let renderer = CaptionRenderer::new(fonts, self.caption.clone());
        let gif_renderer = renderer.with_config(self.gif_caption.unwrap_or(self.caption));
        let image = ImagePipeline::new(Arc::clone(&fetcher), renderer).jpeg_quality(self.jpeg_quality);
        let gif = GifPipeline::new(fetcher, gif_renderer, FailFastPool::new(self.frame_concurrency))
            .max_canvas_pixels(self.max_gif_pixels);

        let image_resolver: Option<Arc<dyn SubjectResolver>> = match self.image_resolver {
            Some(resolver) => Some(resolver),
            None => match self.unsplash_key {
                Some(key) => Some(Arc::new(UnsplashClient::new(key)?)),
                None => None,
            },
        };
        let gif_resolver: Option<Arc<dyn SubjectResolver>> = match self.gif_resolver {
            Some(resolver) => Some(resolver),
            None => match self.tenor_keys {
                Some((api_key, client_key)) => Some(Arc::new(TenorClient::new(api_key, client_key)?)),
                None => None,
            },
        };

        let store: Arc<dyn RemoteStore> = self
            .remote_store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let source = |resolver: Arc<dyn SubjectResolver>| {
            let config = self.remote_cache.clone().namespace(resolver.name());
            debug!(provider = resolver.name(), store = store.name(), "subject cache configured");
            SubjectSource {
                cache: RemoteCache::new(Arc::clone(&store), config),
                resolver,
            }
        };
        let image_source = image_resolver.map(&source);
        let gif_source = gif_resolver.map(&source);

        let artifacts = self.artifact_cache.then(|| {
            ArtifactCache::new(self.artifact_dir.unwrap_or_else(ArtifactCache::default_dir))
        });

        Ok(CaptionService {
            artifacts,
            image,
            gif,
            image_source,
            gif_source,
            cache_ttl: self.cache_ttl,
        })
    }
}
