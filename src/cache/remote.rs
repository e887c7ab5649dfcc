//! Generic get-or-load cache over a [`RemoteStore`].
//!
//! [`RemoteCache::get`] answers from, in order: the optional in-process
//! mirror, the backing store, and finally the caller's loader. Loaded values
//! are written through to both tiers.
//!
//! # TTL extension
//!
//! Every entry records when it was written and how many times its lifetime
//! has been extended. A read of an entry older than `extend_after * ttl`
//! rewrites it with a fresh lifetime in the background, at most
//! `max_extensions` times. Hot entries stay warm; nothing lives forever.
//!
//! # Client-side mirror
//!
//! With [`ClientSideConfig`] set, recently read entries are mirrored in a
//! bounded moka cache. The store's invalidation channel drops mirrored keys;
//! if the listener falls behind the whole mirror is cleared.
//!
//! # Single flight
//!
//! Concurrent misses on one key run the loader once. Followers wait on a
//! per-key lock and then re-read the cache.
//!
//! Store and serialisation failures are logged and treated as misses: the
//! cache never turns a loadable value into an error. Loader errors are
//! returned unchanged and nothing is cached.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use super::store::RemoteStore;
use crate::types::DEFAULT_CACHE_TTL;
use crate::{Result, telemetry, version};

/// In-process mirror settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSideConfig {
    /// Maximum mirrored entries. Default: 10,000.
    pub max_entries: u64,
    /// Upper bound on how long a mirrored copy is trusted without
    /// re-reading the store. Default: 5 minutes.
    pub ttl: Duration,
}

impl Default for ClientSideConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Configuration for a [`RemoteCache`].
///
/// ```rust
/// # use kitten::cache::{ClientSideConfig, RemoteCacheConfig};
/// # use std::time::Duration;
/// let config = RemoteCacheConfig::new("unsplash")
///     .ttl(Duration::from_secs(86_400))
///     .extend_after(Some(0.5))
///     .max_extensions(3)
///     .client_side(Some(ClientSideConfig::default()));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCacheConfig {
    /// Key namespace, also the `namespace` metric label.
    pub namespace: String,
    /// Lifetime of a written entry. Default: 7 days.
    pub ttl: Duration,
    /// Fraction of `ttl` after which a read extends the entry. `None`
    /// disables extension. Default: 0.5.
    pub extend_after: Option<f64>,
    /// Extensions granted per entry. Default: 3.
    pub max_extensions: u32,
    /// In-process mirror. Default: disabled.
    pub client_side: Option<ClientSideConfig>,
}

impl Default for RemoteCacheConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

impl RemoteCacheConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ttl: DEFAULT_CACHE_TTL,
            extend_after: Some(0.5),
            max_extensions: 3,
            client_side: None,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn extend_after(mut self, fraction: Option<f64>) -> Self {
        self.extend_after = fraction.map(|f| f.clamp(0.0, 1.0));
        self
    }

    pub fn max_extensions(mut self, n: u32) -> Self {
        self.max_extensions = n;
        self
    }

    pub fn client_side(mut self, config: Option<ClientSideConfig>) -> Self {
        self.client_side = config;
        self
    }
}

/// A cached value with its lifetime bookkeeping. This is what the store holds,
/// serialised as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    /// Unix time of the last write, in milliseconds.
    pub inserted_at_ms: u64,
    pub ttl_ms: u64,
    /// Extensions granted so far.
    pub hit_count: u32,
}

impl<V> CacheEntry<V> {
    pub fn new(key: impl Into<String>, value: V, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value,
            inserted_at_ms: now_ms(),
            ttl_ms: ttl.as_millis() as u64,
            hit_count: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn age(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.inserted_at_ms))
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.age(now_ms) >= self.ttl()
    }

    /// Whether a read at `now_ms` should extend this entry.
    pub fn wants_extension(&self, now_ms: u64, extend_after: f64, max_extensions: u32) -> bool {
        self.hit_count < max_extensions
            && !self.is_expired(now_ms)
            && self.age(now_ms).as_secs_f64() >= self.ttl().as_secs_f64() * extend_after
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

type Inflight = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Releases a key's single-flight lock entry once its last holder is done,
/// including when the owning future is dropped mid-load.
struct InflightGuard {
    inflight: Inflight,
    key: String,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        // The map and this guard hold the only references: nobody else waits.
        if Arc::strong_count(&self.gate) == 2 {
            inflight.remove(&self.key);
        }
    }
}

/// Get-or-load cache for values of type `V`.
pub struct RemoteCache<V> {
    store: Arc<dyn RemoteStore>,
    config: RemoteCacheConfig,
    mirror: Option<Cache<String, CacheEntry<V>>>,
    inflight: Inflight,
    listener: Option<JoinHandle<()>>,
}

impl<V> RemoteCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Cache over `store`. With a client-side mirror configured and a tokio
    /// runtime available, this spawns the invalidation listener.
    pub fn new(store: Arc<dyn RemoteStore>, config: RemoteCacheConfig) -> Self {
        let mirror = config.client_side.as_ref().map(|cs| {
            Cache::builder()
                .max_capacity(cs.max_entries)
                .time_to_live(cs.ttl)
                .build()
        });

        let listener = mirror
            .clone()
            .and_then(|mirror| spawn_listener(store.as_ref(), mirror, &config.namespace));

        Self {
            store,
            config,
            mirror,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            listener,
        }
    }

    pub fn config(&self) -> &RemoteCacheConfig {
        &self.config
    }

    /// Store key for `id`: `kitten:v<rev>:<namespace>:<id>`.
    pub fn key(&self, id: &str) -> String {
        format!("{}:{}:{id}", version::cache_prefix(), self.config.namespace)
    }

    /// Return the cached value for `id`, calling `loader` on a miss.
    pub async fn get<F, Fut>(&self, id: &str, loader: F) -> Result<V>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let key = self.key(id);

        if let Some(entry) = self.lookup(&key).await {
            return Ok(self.hit(entry));
        }

        let guard = self.gate(&key);
        let _lock = guard.gate.lock().await;

        // Another caller may have loaded it while we waited.
        if let Some(entry) = self.lookup(&key).await {
            return Ok(self.hit(entry));
        }

        metrics::counter!(telemetry::REMOTE_CACHE_MISSES_TOTAL, "namespace" => self.config.namespace.clone())
            .increment(1);
        let value = loader(id.to_string()).await?;

        let entry = CacheEntry::new(key, value, self.config.ttl);
        self.write_through(&entry).await;
        Ok(entry.value)
    }

    /// Store `value` under `id`, replacing any cached copy everywhere.
    pub async fn set(&self, id: &str, value: V) -> Result<()> {
        let key = self.key(id);
        let entry = CacheEntry::new(key.clone(), value, self.config.ttl);
        let bytes = serde_json::to_vec(&entry)?;
        self.store.set(&key, bytes, self.config.ttl).await?;
        self.store.publish_invalidation(&key).await?;
        if let Some(mirror) = &self.mirror {
            mirror.insert(key, entry).await;
        }
        Ok(())
    }

    /// Drop `id` from the store, the local mirror and every subscribed mirror.
    pub async fn invalidate(&self, id: &str) -> Result<()> {
        let key = self.key(id);
        if let Some(mirror) = &self.mirror {
            mirror.invalidate(&key).await;
        }
        self.store.delete(&key).await?;
        self.store.publish_invalidation(&key).await
    }

    async fn lookup(&self, key: &str) -> Option<CacheEntry<V>> {
        let now = now_ms();

        if let Some(mirror) = &self.mirror {
            match mirror.get(key).await {
                Some(entry) if !entry.is_expired(now) => return Some(entry),
                Some(_) => mirror.invalidate(key).await,
                None => {}
            }
        }

        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(store = self.store.name(), key, error = %e, "remote cache read failed");
                return None;
            }
        };

        let entry: CacheEntry<V> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "discarding undecodable remote cache entry");
                return None;
            }
        };
        if entry.is_expired(now) {
            return None;
        }

        if let Some(mirror) = &self.mirror {
            mirror.insert(key.to_string(), entry.clone()).await;
        }
        Some(entry)
    }

    fn hit(&self, entry: CacheEntry<V>) -> V {
        metrics::counter!(telemetry::REMOTE_CACHE_HITS_TOTAL, "namespace" => self.config.namespace.clone())
            .increment(1);

        if let Some(extend_after) = self.config.extend_after
            && entry.wants_extension(now_ms(), extend_after, self.config.max_extensions)
        {
            self.spawn_extension(entry.clone());
        }
        entry.value
    }

    /// Rewrite `entry` with a fresh lifetime on a detached task.
    fn spawn_extension(&self, entry: CacheEntry<V>) {
        let store = Arc::clone(&self.store);
        let mirror = self.mirror.clone();
        let ttl = self.config.ttl;
        let namespace = self.config.namespace.clone();

        tokio::spawn(async move {
            let key = entry.key.clone();
            // Never resurrect an entry deleted since it was read.
            match store.expire(&key, ttl).await {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    warn!(store = store.name(), key = %key, error = %e, "remote cache extension failed");
                    return;
                }
            }

            let extended = CacheEntry {
                inserted_at_ms: now_ms(),
                hit_count: entry.hit_count + 1,
                ..entry
            };
            let bytes = match serde_json::to_vec(&extended) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to encode extended cache entry");
                    return;
                }
            };
            if let Err(e) = store.set(&key, bytes, ttl).await {
                warn!(store = store.name(), key = %key, error = %e, "remote cache extension failed");
                return;
            }
            if let Some(mirror) = mirror {
                mirror.insert(key.clone(), extended.clone()).await;
            }

            metrics::counter!(telemetry::REMOTE_CACHE_EXTENSIONS_TOTAL, "namespace" => namespace)
                .increment(1);
            debug!(key = %key, extensions = extended.hit_count, "extended remote cache entry");
        });
    }

    async fn write_through(&self, entry: &CacheEntry<V>) {
        if let Some(mirror) = &self.mirror {
            mirror.insert(entry.key.clone(), entry.clone()).await;
        }

        let bytes = match serde_json::to_vec(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %entry.key, error = %e, "failed to encode remote cache entry");
                return;
            }
        };
        if let Err(e) = self.store.set(&entry.key, bytes, self.config.ttl).await {
            warn!(store = self.store.name(), key = %entry.key, error = %e, "remote cache write failed");
        }
    }

    fn gate(&self, key: &str) -> InflightGuard {
        let gate = Arc::clone(
            self.inflight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .entry(key.to_string())
                .or_default(),
        );
        InflightGuard {
            inflight: Arc::clone(&self.inflight),
            key: key.to_string(),
            gate,
        }
    }
}

impl<V> Drop for RemoteCache<V> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

fn spawn_listener<V>(
    store: &dyn RemoteStore,
    mirror: Cache<String, CacheEntry<V>>,
    namespace: &str,
) -> Option<JoinHandle<()>>
where
    V: Clone + Send + Sync + 'static,
{
    let receiver = store.subscribe()?;
    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            warn!(namespace, "no tokio runtime, client-side invalidations disabled");
            return None;
        }
    };

    let namespace = namespace.to_string();
    Some(runtime.spawn(async move {
        let mut invalidations = BroadcastStream::new(receiver);
        while let Some(message) = invalidations.next().await {
            match message {
                Ok(key) => mirror.invalidate(&key).await,
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    warn!(namespace = %namespace, missed, "invalidation listener lagged, clearing mirror");
                    mirror.invalidate_all();
                }
            }
        }
        debug!(namespace = %namespace, "invalidation channel closed");
    }))
}
