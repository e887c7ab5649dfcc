//! Resolver trait for upstream media providers.
//!
//! A [`SubjectResolver`] turns an opaque subject id into the
//! [`SubjectMetadata`] needed to fetch and attribute the media. The service
//! wraps every resolver in a [`RemoteCache`](crate::cache::RemoteCache), so
//! implementations should not cache themselves. Search results are written
//! into that same cache, so a later lookup by id is a hit.

use async_trait::async_trait;

use crate::types::{SearchHit, SubjectMetadata};
use crate::{KittenError, Result};

/// Resolves subject ids against an upstream media API.
///
/// Errors follow the crate taxonomy: an unknown id is
/// [`NotFound`](crate::KittenError::NotFound), throttling is
/// [`RateLimited`](crate::KittenError::RateLimited).
#[async_trait]
pub trait SubjectResolver: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Look up `id`.
    async fn resolve(&self, id: &str) -> Result<SubjectMetadata>;

    /// Find a subject matching `query`. `cursor` is the `next` value of a
    /// previous hit, for providers that page their results.
    ///
    /// Default: [`NotFound`](KittenError::NotFound), for providers without search.
    async fn search(&self, query: &str, _cursor: Option<&str>) -> Result<SearchHit> {
        Err(KittenError::NotFound(format!(
            "{} cannot search for `{query}`",
            self.name()
        )))
    }

    /// Report that `subject` was rendered, e.g. a download or share event.
    ///
    /// Called on a detached task after a successful resolution; failures are
    /// logged and otherwise ignored. Default: no-op.
    async fn notify_used(&self, _subject: &SubjectMetadata, _search: Option<&str>) -> Result<()> {
        Ok(())
    }
}
