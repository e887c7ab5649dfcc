//! Tests for the get-or-load remote cache over the in-process store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use kitten::cache::{
    CacheEntry, ClientSideConfig, MemoryStore, RemoteCache, RemoteCacheConfig, RemoteStore,
};
use kitten::{KittenError, telemetry};

// ============================================================================
// Helpers
// ============================================================================

fn cache(store: &Arc<MemoryStore>, config: RemoteCacheConfig) -> RemoteCache<String> {
    RemoteCache::new(Arc::clone(store) as Arc<dyn RemoteStore>, config)
}

async fn stored_entry(store: &MemoryStore, key: &str) -> CacheEntry<String> {
    let bytes = store.get(key).await.unwrap().expect("entry should be stored");
    serde_json::from_slice(&bytes).unwrap()
}

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

/// Loader for reads that must be served from the cache.
async fn never(id: String) -> kitten::Result<String> {
    panic!("`{id}` should have been cached")
}

fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

// ============================================================================
// Get-or-load
// ============================================================================

#[tokio::test]
async fn loader_runs_once_then_hits() {
    let store = Arc::new(MemoryStore::new());
    let cache = cache(&store, RemoteCacheConfig::new("unsplash"));
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let calls = Arc::clone(&calls);
        let value = cache
            .get("abc123", |id| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, KittenError>(format!("https://images.example.com/{id}"))
            })
            .await
            .unwrap();
        assert_eq!(value, "https://images.example.com/abc123");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let entry = stored_entry(&store, &cache.key("abc123")).await;
    assert_eq!(entry.value, "https://images.example.com/abc123");
    assert_eq!(entry.hit_count, 0);
}

#[tokio::test]
async fn keys_are_namespaced_and_versioned() {
    let store = Arc::new(MemoryStore::new());
    let cache = cache(&store, RemoteCacheConfig::new("tenor"));
    assert_eq!(
        cache.key("42"),
        format!("{}:tenor:42", kitten::version::cache_prefix())
    );
}

#[tokio::test]
async fn loader_errors_propagate_and_are_not_cached() {
    let store = Arc::new(MemoryStore::new());
    let cache = cache(&store, RemoteCacheConfig::new("unsplash"));

    let err = cache
        .get("missing", |id| async move {
            Err::<String, _>(KittenError::NotFound(format!("unsplash photo `{id}`")))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, KittenError::NotFound(_)));
    assert!(store.is_empty());

    let value = cache
        .get("missing", |_| async { Ok::<_, KittenError>("found later".to_string()) })
        .await
        .unwrap();
    assert_eq!(value, "found later");
}

#[tokio::test]
async fn concurrent_misses_load_once() {
    let store = Arc::new(MemoryStore::new());
    let cache = cache(&store, RemoteCacheConfig::new("tenor"));
    let calls = Arc::new(AtomicUsize::new(0));

    let reads = (0..8).map(|_| {
        let calls = Arc::clone(&calls);
        cache.get("popular", move |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, KittenError>("value".to_string())
        })
    });
    let results = join_all(reads).await;

    assert!(results.iter().all(|r| matches!(r.as_deref(), Ok("value"))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_entries_reload() {
    let store = Arc::new(MemoryStore::new());
    let config = RemoteCacheConfig::new("unsplash")
        .ttl(Duration::from_millis(50))
        .extend_after(None);
    let cache = cache(&store, config);
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        cache
            .get("abc", |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, KittenError>("v".to_string())
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// TTL extension
// ============================================================================

#[tokio::test]
async fn ageing_entries_are_extended_up_to_the_limit() {
    let store = Arc::new(MemoryStore::new());
    let config = RemoteCacheConfig::new("unsplash")
        .ttl(Duration::from_millis(400))
        .extend_after(Some(0.5))
        .max_extensions(1);
    let cache = cache(&store, config);
    let key = cache.key("abc");

    cache.get("abc", |_| async { Ok::<_, KittenError>("v".to_string()) }).await.unwrap();

    // Past half the TTL: the read extends the entry.
    tokio::time::sleep(Duration::from_millis(250)).await;
    cache.get("abc", never).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let entry = stored_entry(&store, &key).await;
    assert_eq!(entry.hit_count, 1);
    assert!(store.ttl(&key).unwrap() > Duration::from_millis(300));

    // Past half the TTL again, but the extension budget is spent.
    tokio::time::sleep(Duration::from_millis(250)).await;
    cache.get("abc", never).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(stored_entry(&store, &key).await.hit_count, 1);
}

#[tokio::test]
async fn young_entries_keep_their_ttl() {
    let store = Arc::new(MemoryStore::new());
    let cache = cache(&store, RemoteCacheConfig::new("unsplash"));
    let key = cache.key("abc");

    cache.get("abc", |_| async { Ok::<_, KittenError>("v".to_string()) }).await.unwrap();
    cache.get("abc", never).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(stored_entry(&store, &key).await.hit_count, 0);
}

// ============================================================================
// Client-side mirror
// ============================================================================

#[tokio::test]
async fn mirrors_drop_entries_invalidated_elsewhere() {
    let store = Arc::new(MemoryStore::new());
    let config = RemoteCacheConfig::new("unsplash").client_side(Some(ClientSideConfig::default()));
    let writer = cache(&store, config.clone());
    let reader = cache(&store, config);

    writer.get("abc", |_| async { Ok::<_, KittenError>("one".to_string()) }).await.unwrap();
    let first = reader.get("abc", never).await.unwrap();
    assert_eq!(first, "one");

    writer.set("abc", "two".to_string()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = reader.get("abc", never).await.unwrap();
    assert_eq!(second, "two");
}

#[tokio::test]
async fn invalidate_forces_a_reload() {
    let store = Arc::new(MemoryStore::new());
    let config = RemoteCacheConfig::new("tenor").client_side(Some(ClientSideConfig::default()));
    let cache = cache(&store, config);

    cache.get("abc", |_| async { Ok::<_, KittenError>("old".to_string()) }).await.unwrap();
    cache.invalidate("abc").await.unwrap();
    assert!(store.is_empty());

    let value = cache.get("abc", |_| async { Ok::<_, KittenError>("new".to_string()) }).await.unwrap();
    assert_eq!(value, "new");
}

// ============================================================================
// Metrics
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn hits_and_misses_are_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let store = Arc::new(MemoryStore::new());
                let cache = cache(&store, RemoteCacheConfig::new("unsplash"));
                for _ in 0..3 {
                    cache.get("abc", |_| async { Ok::<_, KittenError>("v".to_string()) }).await.unwrap();
                }
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::REMOTE_CACHE_MISSES_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::REMOTE_CACHE_HITS_TOTAL), 2);
}
