//! Caching subsystem.
//!
//! Two independent tiers:
//!
//! - [`ArtifactCache`]: rendered bytes on local disk, addressed by
//!   [`CacheKey`]. Consulted before any pipeline runs; populated by detached
//!   writes after a render. Bounded by [`ArtifactCache::sweep`].
//!
//! - [`RemoteCache`]: generic get-or-load over a [`RemoteStore`], used for
//!   subject metadata so repeated renders of one subject do not hit the
//!   upstream API. Supports TTL extension on read, an invalidated
//!   in-process mirror and single-flight loading.
//!
//! Neither tier ever fails a request: cache errors are logged and degrade to
//! misses.

pub mod artifact;
pub mod key;
#[cfg(feature = "redis")]
pub mod redis;
pub mod remote;
pub mod store;

pub use artifact::{ArtifactCache, SweepConfig, SweepReport};
pub use key::CacheKey;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
pub use remote::{CacheEntry, ClientSideConfig, RemoteCache, RemoteCacheConfig};
pub use store::{MemoryStore, RemoteStore};
