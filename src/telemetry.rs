//! Telemetry metric name constants.
//!
//! Consumers install their own `metrics` recorder (e.g. prometheus, statsd);
//! without a recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `kitten_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `kind`: "image" or "gif"
//! - `namespace`: remote cache namespace (e.g. "unsplash", "tenor")
//! - `source`: origin of a served artifact, "cache" or "render"

/// Artifact cache lookups that found a file on disk.
///
/// Labels: `kind`.
pub const ARTIFACT_CACHE_HITS_TOTAL: &str = "kitten_artifact_cache_hits_total";

/// Artifact cache lookups that missed (including recovered I/O errors).
///
/// Labels: `kind`.
pub const ARTIFACT_CACHE_MISSES_TOTAL: &str = "kitten_artifact_cache_misses_total";

/// Artifact files removed by the eviction sweep.
pub const ARTIFACT_CACHE_EVICTIONS_TOTAL: &str = "kitten_artifact_cache_evictions_total";

/// Artifacts returned to callers.
///
/// Labels: `kind`, `source` ("cache" | "render").
pub const ARTIFACTS_SERVED_TOTAL: &str = "kitten_artifacts_served_total";

/// Remote cache reads answered without calling the loader.
///
/// Labels: `namespace`.
pub const REMOTE_CACHE_HITS_TOTAL: &str = "kitten_remote_cache_hits_total";

/// Remote cache reads that invoked the loader.
///
/// Labels: `namespace`.
pub const REMOTE_CACHE_MISSES_TOTAL: &str = "kitten_remote_cache_misses_total";

/// TTL extensions triggered by reads of ageing entries.
///
/// Labels: `namespace`.
pub const REMOTE_CACHE_EXTENSIONS_TOTAL: &str = "kitten_remote_cache_extensions_total";

/// Wall time of a full fetch-decode-caption-encode pipeline run.
///
/// Labels: `kind`.
pub const RENDER_DURATION_SECONDS: &str = "kitten_render_duration_seconds";
