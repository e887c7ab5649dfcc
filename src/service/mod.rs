//! Render orchestration.
//!
//! [`CaptionService`] ties the caches, resolvers and pipelines together:
//!
//! 1. look the request up in the [`ArtifactCache`]; a hit returns at once
//!    without touching the network;
//! 2. resolve the subject through its provider's [`RemoteCache`];
//! 3. fire the provider's usage notification on a detached task;
//! 4. run the kind's pipeline;
//! 5. hand the result to a detached artifact store and return it.
//!
//! Detached work is spawned with `tokio::spawn` so it completes even if the
//! caller is dropped after the response is sent.
//!
//! [`CaptionService::search`] asks the provider for a subject first, writes
//! the hit into its [`RemoteCache`] and then follows the same path.

mod builder;

pub use builder::{Kitten, KittenBuilder};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::cache::{ArtifactCache, CacheKey, RemoteCache};
use crate::providers::SubjectResolver;
use crate::render::{GifPipeline, ImagePipeline};
use crate::types::{
    CaptionRequest, MediaKind, RenderedArtifact, SearchHit, SubjectMetadata, cache_control_header,
};
use crate::{KittenError, Result, telemetry};

/// A resolver and the remote cache in front of it.
pub(crate) struct SubjectSource {
    pub(crate) resolver: Arc<dyn SubjectResolver>,
    pub(crate) cache: RemoteCache<SubjectMetadata>,
}

impl SubjectSource {
    async fn resolve(&self, id: &str) -> Result<SubjectMetadata> {
        let resolver = Arc::clone(&self.resolver);
        self.cache
            .get(id, move |id| async move { resolver.resolve(&id).await })
            .await
    }
}

/// A search hit and the artifact rendered over it.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub hit: SearchHit,
    pub artifact: RenderedArtifact,
}

/// Captioning front door. Build one with [`Kitten::builder`].
pub struct CaptionService {
    artifacts: Option<ArtifactCache>,
    image: ImagePipeline,
    gif: GifPipeline,
    image_source: Option<SubjectSource>,
    gif_source: Option<SubjectSource>,
    cache_ttl: Duration,
}

impl CaptionService {
    /// Render `request`, serving from the artifact cache when possible.
    pub async fn render(&self, request: &CaptionRequest) -> Result<RenderedArtifact> {
        let kind = request.kind();
        let key = CacheKey::for_request(request);

        if let Some(artifact) = self.cached(&key).await {
            return Ok(artifact);
        }

        let source = self.source(kind)?;
        let subject = source.resolve(request.subject_id()).await?;
        self.notify_used(source, &subject, request.search());

        let bytes = self.run_pipeline(kind, &subject.source_url, request.caption()).await?;
        Ok(self.finish(key, kind, bytes))
    }

    /// Search `kind`'s provider for `query` and render `caption` over the hit.
    ///
    /// `cursor` continues an earlier search from its `next` value. The hit
    /// is stored in the subject cache, so rendering it again by id does not
    /// call the provider. The artifact is keyed with `query` as the search
    /// term.
    pub async fn search(
        &self,
        kind: MediaKind,
        query: &str,
        cursor: Option<&str>,
        caption: &str,
    ) -> Result<SearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(KittenError::BadInput("query param is required".to_string()));
        }
        if caption.trim().is_empty() {
            return Err(KittenError::BadInput("caption param is required".to_string()));
        }

        let source = self.source(kind)?;
        let hit = source.resolver.search(query, cursor).await?;
        if let Err(e) = source.cache.set(&hit.subject.id, hit.subject.clone()).await {
            warn!(
                provider = source.resolver.name(),
                id = %hit.subject.id,
                error = %e,
                "failed to cache search hit"
            );
        }

        let request = CaptionRequest::new(&hit.subject.id, caption, kind)?.with_search(query);
        let artifact = self.render(&request).await?;
        Ok(SearchOutcome { hit, artifact })
    }

    /// Render `caption` over the media at `url`, bypassing subject resolution.
    /// Results are cached with the URL as subject id.
    pub async fn render_url(
        &self,
        kind: MediaKind,
        url: &str,
        caption: &str,
    ) -> Result<RenderedArtifact> {
        let request = CaptionRequest::new(url, caption, kind)?;
        let key = CacheKey::for_request(&request);

        if let Some(artifact) = self.cached(&key).await {
            return Ok(artifact);
        }

        let bytes = self
            .run_pipeline(kind, request.subject_id(), request.caption())
            .await?;
        Ok(self.finish(key, kind, bytes))
    }

    /// Caption in-memory media. Never cached.
    pub async fn render_bytes(
        &self,
        kind: MediaKind,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<RenderedArtifact> {
        let caption = caption.trim();
        if caption.is_empty() {
            return Err(KittenError::BadInput("caption param is required".to_string()));
        }

        let started = Instant::now();
        let result = match kind {
            MediaKind::Image => self.image.caption_bytes(bytes, caption).await,
            MediaKind::Gif => self.gif.caption_bytes(bytes, caption).await,
        };
        record_duration(kind, started);
        Ok(RenderedArtifact::new(kind, result?))
    }

    /// `Cache-Control` value for served artifacts.
    pub fn cache_control(&self) -> String {
        cache_control_header(self.cache_ttl)
    }

    pub fn artifact_cache(&self) -> Option<&ArtifactCache> {
        self.artifacts.as_ref()
    }

    pub fn image_pipeline(&self) -> &ImagePipeline {
        &self.image
    }

    pub fn gif_pipeline(&self) -> &GifPipeline {
        &self.gif
    }

    /// Drop a subject from the metadata cache of `kind`'s provider.
    pub async fn invalidate_subject(&self, kind: MediaKind, id: &str) -> Result<()> {
        self.source(kind)?.cache.invalidate(id).await
    }

    async fn cached(&self, key: &CacheKey) -> Option<RenderedArtifact> {
        let bytes = self.artifacts.as_ref()?.lookup(key).await?;
        served(key.kind(), "cache");
        debug!(key = %key, bytes = bytes.len(), "served from artifact cache");
        Some(RenderedArtifact::new(key.kind(), bytes))
    }

    fn source(&self, kind: MediaKind) -> Result<&SubjectSource> {
        let source = match kind {
            MediaKind::Image => self.image_source.as_ref(),
            MediaKind::Gif => self.gif_source.as_ref(),
        };
        source.ok_or_else(|| {
            KittenError::Configuration(format!("no {kind} provider configured"))
        })
    }

    fn notify_used(&self, source: &SubjectSource, subject: &SubjectMetadata, search: Option<&str>) {
        let resolver = Arc::clone(&source.resolver);
        let subject = subject.clone();
        let search = search.map(str::to_string);
        tokio::spawn(async move {
            if let Err(e) = resolver.notify_used(&subject, search.as_deref()).await {
                warn!(provider = resolver.name(), id = %subject.id, error = %e, "usage notification failed");
            }
        });
    }

    async fn run_pipeline(&self, kind: MediaKind, url: &str, caption: &str) -> Result<Vec<u8>> {
        let started = Instant::now();
        let result = match kind {
            MediaKind::Image => self.image.generate(url, caption).await,
            MediaKind::Gif => self.gif.generate(url, caption).await,
        };
        record_duration(kind, started);
        result
    }

    fn finish(&self, key: CacheKey, kind: MediaKind, bytes: Vec<u8>) -> RenderedArtifact {
        let artifact = RenderedArtifact::new(kind, bytes);
        if let Some(artifacts) = &self.artifacts {
            artifacts.store(key, artifact.shared_bytes());
        }
        served(kind, "render");
        artifact
    }
}

fn served(kind: MediaKind, source: &'static str) {
    metrics::counter!(telemetry::ARTIFACTS_SERVED_TOTAL, "kind" => kind.as_str(), "source" => source)
        .increment(1);
}

fn record_duration(kind: MediaKind, started: Instant) {
    metrics::histogram!(telemetry::RENDER_DURATION_SECONDS, "kind" => kind.as_str())
        .record(started.elapsed().as_secs_f64());
}
