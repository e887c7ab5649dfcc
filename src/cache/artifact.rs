//! On-disk cache of rendered artifacts.
//!
//! One file per [`CacheKey`], named `<digest>.<ext>` directly under the
//! cache directory. Lookups never fail: a missing file is a miss, and any
//! other I/O error is logged and also reported as a miss. Stores run
//! detached from the caller and only ever log failures.
//!
//! Files are written to a unique temporary name and renamed into place, so
//! a reader sees either the complete artifact or nothing. Two writers racing
//! on the same key both produce identical bytes; the last rename wins.
//!
//! Growth is bounded by [`ArtifactCache::sweep`], which removes files by
//! age and then by least-recent use. A hit refreshes the file's
//! modification time so that it approximates the last access. Temporary
//! files orphaned by a crash mid-write are removed once they are older than
//! [`SweepConfig::temp_grace`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::key::CacheKey;
use crate::types::MediaKind;
use crate::{KittenError, Result, telemetry};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Eviction policy for [`ArtifactCache::sweep`].
///
/// ```rust
/// # use kitten::cache::SweepConfig;
/// # use std::time::Duration;
/// let config = SweepConfig::new()
///     .max_age(Some(Duration::from_secs(7 * 86_400)))
///     .max_bytes(Some(256 << 20));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// Files not touched for longer than this are removed. Default: 30 days.
    pub max_age: Option<Duration>,
    /// Total size budget; least recently used files go first. Default: 1 GiB.
    pub max_bytes: Option<u64>,
    /// Age past which a leftover temporary file counts as orphaned. Default: 1 hour.
    pub temp_grace: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_age: Some(Duration::from_secs(30 * 86_400)),
            max_bytes: Some(1 << 30),
            temp_grace: Duration::from_secs(3600),
        }
    }
}

impl SweepConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn max_bytes(mut self, max_bytes: Option<u64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn temp_grace(mut self, grace: Duration) -> Self {
        self.temp_grace = grace;
        self
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Artifact files found.
    pub scanned: usize,
    /// Files removed.
    pub removed: usize,
    pub bytes_freed: u64,
    pub bytes_remaining: u64,
    /// Orphaned temporary files removed. Not counted in `removed`.
    pub temp_removed: usize,
}

/// Content-addressed artifact store rooted at a directory.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    /// Cache rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.cache/kitten` (platform cache dir), or `.cache/kitten` if unknown.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("kitten")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Read the artifact stored under `key`, if any.
    pub async fn lookup(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let path = self.path_for(key);
        let kind = key.kind().as_str();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                metrics::counter!(telemetry::ARTIFACT_CACHE_HITS_TOTAL, "kind" => kind)
                    .increment(1);
                // Best-effort LRU bookkeeping; the read already succeeded.
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = touch(&path) {
                        debug!(path = %path.display(), error = %e, "failed to refresh artifact mtime");
                    }
                });
                Some(bytes)
            }
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to read cached artifact");
                }
                metrics::counter!(telemetry::ARTIFACT_CACHE_MISSES_TOTAL, "kind" => kind)
                    .increment(1);
                None
            }
        }
    }

    /// Write `bytes` under `key` on a detached task. Failures are logged.
    ///
    /// The returned handle may be dropped; the write still completes.
    pub fn store(&self, key: CacheKey, bytes: Arc<[u8]>) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.write(&key, &bytes).await {
                warn!(key = %key, error = %e, "failed to store artifact");
            } else {
                debug!(key = %key, bytes = bytes.len(), "stored artifact");
            }
        })
    }

    /// Atomically write `bytes` under `key`.
    pub async fn write(&self, key: &CacheKey, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error("create cache dir", &self.dir, e))?;

        let path = self.path_for(key);
        let tmp_path = self.dir.join(format!(
            ".{}.{}-{}.tmp",
            key.file_name(),
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(io_error("write", &tmp_path, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(io_error("rename", &path, e));
        }
        Ok(())
    }

    /// Remove expired artifacts, then the least recently used ones until the
    /// total size fits the budget.
    pub async fn sweep(&self, config: &SweepConfig) -> Result<SweepReport> {
        let dir = self.dir.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || sweep_dir(&dir, &config, SystemTime::now()))
            .await
            .map_err(|e| KittenError::Cache(format!("sweep task failed: {e}")))?
    }

    /// Sweep every `interval` until the handle is aborted. The first sweep
    /// runs immediately.
    pub fn spawn_sweeper(&self, config: SweepConfig, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match cache.sweep(&config).await {
                    Ok(report) if report.removed > 0 || report.temp_removed > 0 => info!(
                        dir = %cache.dir.display(),
                        removed = report.removed,
                        temp_removed = report.temp_removed,
                        bytes_freed = report.bytes_freed,
                        bytes_remaining = report.bytes_remaining,
                        "swept artifact cache"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!(dir = %cache.dir.display(), error = %e, "artifact sweep failed"),
                }
            }
        })
    }
}

struct Entry {
    path: PathBuf,
    len: u64,
    modified: SystemTime,
}

fn sweep_dir(dir: &Path, config: &SweepConfig, now: SystemTime) -> Result<SweepReport> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SweepReport::default()),
        Err(e) => return Err(io_error("read cache dir", dir, e)),
    };

    let mut entries = Vec::new();
    let mut temp_removed = 0;
    for dirent in read_dir {
        let dirent = match dirent {
            Ok(d) => d,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to read cache dir entry");
                continue;
            }
        };
        let path = dirent.path();
        if is_temp(&path) {
            if remove_orphan(&path, config.temp_grace, now) {
                temp_removed += 1;
            }
            continue;
        }
        if !is_artifact(&path) {
            continue;
        }
        match dirent.metadata() {
            Ok(meta) if meta.is_file() => entries.push(Entry {
                path,
                len: meta.len(),
                modified: meta.modified().unwrap_or(now),
            }),
            Ok(_) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to stat artifact"),
        }
    }

    let mut report = SweepReport {
        scanned: entries.len(),
        temp_removed,
        ..Default::default()
    };

    if let Some(max_age) = config.max_age {
        let (expired, fresh): (Vec<_>, Vec<_>) = entries.into_iter().partition(|entry| {
            now.duration_since(entry.modified)
                .is_ok_and(|age| age > max_age)
        });
        entries = fresh;
        for entry in expired {
            if !remove(&entry, &mut report) {
                entries.push(entry);
            }
        }
    }

    entries.sort_by_key(|entry| entry.modified);
    let mut total: u64 = entries.iter().map(|e| e.len).sum();

    if let Some(max_bytes) = config.max_bytes {
        let mut remaining = Vec::with_capacity(entries.len());
        let mut oldest_first = entries.into_iter();
        for entry in oldest_first.by_ref() {
            if total <= max_bytes {
                remaining.push(entry);
                break;
            }
            if remove(&entry, &mut report) {
                total -= entry.len;
            } else {
                remaining.push(entry);
            }
        }
        remaining.extend(oldest_first);
        entries = remaining;
    }

    report.bytes_remaining = entries.iter().map(|e| e.len).sum();
    metrics::counter!(telemetry::ARTIFACT_CACHE_EVICTIONS_TOTAL).increment(report.removed as u64);
    Ok(report)
}

/// Delete one artifact. Returns whether it is gone.
fn remove(entry: &Entry, report: &mut SweepReport) -> bool {
    match std::fs::remove_file(&entry.path) {
        Ok(()) => {
            report.removed += 1;
            report.bytes_freed += entry.len;
            true
        }
        // Removed concurrently by someone else.
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %entry.path.display(), error = %e, "failed to evict artifact");
            false
        }
    }
}

/// Delete a temporary file left by an interrupted write if it is older than
/// `grace`. Returns whether it was removed.
fn remove_orphan(path: &Path, grace: Duration, now: SystemTime) -> bool {
    let stale = std::fs::metadata(path).is_ok_and(|meta| {
        meta.is_file()
            && meta
                .modified()
                .is_ok_and(|modified| now.duration_since(modified).is_ok_and(|age| age > grace))
    });
    if !stale {
        return false;
    }
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed orphaned temp file");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove orphaned temp file");
            false
        }
    }
}

/// Names produced by [`ArtifactCache::write`] before the rename.
fn is_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.') && name.ends_with(".tmp"))
}

fn is_artifact(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    [MediaKind::Image, MediaKind::Gif]
        .iter()
        .any(|kind| kind.extension() == ext)
}

fn touch(path: &Path) -> std::io::Result<()> {
    std::fs::File::options()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now())
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> KittenError {
    KittenError::Cache(format!("failed to {action} {}: {err}", path.display()))
}
