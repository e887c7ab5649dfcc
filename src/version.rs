//! Version information and the cache namespace derived from it.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Revision of the rendered output and cached payload layout.
///
/// Bump when rendering changes pixels or when a cached value type changes
/// shape, so stale entries written by older builds are never read back.
pub const CACHE_REVISION: u32 = 1;

/// Prefix applied to every remote cache key: `kitten:v{CACHE_REVISION}`.
pub fn cache_prefix() -> String {
    format!("kitten:v{CACHE_REVISION}")
}

/// Version string reported by the binaries: `{version} (cache v{revision})`.
pub fn version_string() -> String {
    format!("{PKG_VERSION} (cache v{CACHE_REVISION})")
}
