//! Configuration loading for kittend.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.kitten/config.toml` (user)
//! 3. `/etc/kitten/config.toml` (system)
//!
//! Without any config file the daemon runs on defaults.
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.kitten/secrets.toml` (user, must be 0600)
//! 2. `/etc/kitten/secrets.toml` (system, must be 0600)

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{ClientSideConfig, RemoteCacheConfig, SweepConfig};
use crate::fetch::{DEFAULT_MAX_BODY_SIZE, FetchConfig};
use crate::render::{
    CaptionConfig, DEFAULT_FRAME_CONCURRENCY, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_CANVAS_PIXELS,
    FontSizing,
};
use crate::{KittenError, Result};

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8080).
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8080".to_string()
}

/// Artifact cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Artifact directory (default: platform cache dir).
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Client cache lifetime in seconds (default: 7 days).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Maximum artifact age in days; 0 disables age eviction (default: 30).
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
    /// Maximum total artifact size in bytes; 0 disables the budget (default: 1 GiB).
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// Seconds between eviction sweeps (default: 1 hour).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_secs: default_ttl_secs(),
            max_age_days: default_max_age_days(),
            max_bytes: default_max_bytes(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    7 * 24 * 3600
}

fn default_max_age_days() -> u64 {
    30
}

fn default_max_bytes() -> u64 {
    1 << 30
}

fn default_sweep_interval() -> u64 {
    3600
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn sweep_config(&self) -> SweepConfig {
        let max_age = (self.max_age_days > 0)
            .then(|| Duration::from_secs(self.max_age_days * 24 * 3600));
        let max_bytes = (self.max_bytes > 0).then_some(self.max_bytes);
        SweepConfig::new().max_age(max_age).max_bytes(max_bytes)
    }
}

/// Rendering settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Font size as a fraction of image width (default: 0.07).
    #[serde(default = "default_font_size_ratio")]
    pub font_size_ratio: f32,
    /// Fixed point size for GIF captions; unset uses `font_size_ratio`.
    #[serde(default)]
    pub gif_font_size: Option<f32>,
    /// Caption wrap width as a fraction of image width (default: 0.8).
    #[serde(default = "default_wrap_ratio")]
    pub wrap_ratio: f32,
    /// GIF frames composited concurrently (default: 8).
    #[serde(default = "default_frame_concurrency")]
    pub frame_concurrency: usize,
    /// JPEG output quality, 1-100 (default: 80).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Maximum source body size in bytes (default: 2 MiB).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
    /// Largest GIF logical screen in pixels (default: 4096 x 4096).
    #[serde(default = "default_max_gif_pixels")]
    pub max_gif_pixels: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_size_ratio: default_font_size_ratio(),
            gif_font_size: None,
            wrap_ratio: default_wrap_ratio(),
            frame_concurrency: default_frame_concurrency(),
            jpeg_quality: default_jpeg_quality(),
            max_body_bytes: default_max_body_bytes(),
            max_gif_pixels: default_max_gif_pixels(),
        }
    }
}

fn default_font_size_ratio() -> f32 {
    0.07
}

fn default_wrap_ratio() -> f32 {
    0.8
}

fn default_frame_concurrency() -> usize {
    DEFAULT_FRAME_CONCURRENCY
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_max_body_bytes() -> u64 {
    DEFAULT_MAX_BODY_SIZE
}

fn default_max_gif_pixels() -> u64 {
    DEFAULT_MAX_CANVAS_PIXELS
}

impl RenderConfig {
    pub fn caption_config(&self) -> CaptionConfig {
        CaptionConfig::new()
            .sizing(FontSizing::Proportional(self.font_size_ratio))
            .wrap_ratio(self.wrap_ratio)
    }

    /// Caption settings for GIFs, when they differ from images.
    pub fn gif_caption_config(&self) -> Option<CaptionConfig> {
        self.gif_font_size
            .map(|points| self.caption_config().sizing(FontSizing::Fixed(points)))
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig::new().max_body_size(self.max_body_bytes)
    }
}

/// Subject metadata cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Redis URL; unset keeps the cache in process.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Entry lifetime in seconds (default: 7 days).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Fraction of the TTL after which reads extend it; 0 disables (default: 0.5).
    #[serde(default = "default_extend_after")]
    pub extend_after: f64,
    /// Maximum extensions per entry (default: 3).
    #[serde(default = "default_max_extensions")]
    pub max_extensions: u32,
    /// Entries kept in the in-process mirror; 0 disables it (default: 0).
    #[serde(default)]
    pub client_side_entries: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl_secs: default_ttl_secs(),
            extend_after: default_extend_after(),
            max_extensions: default_max_extensions(),
            client_side_entries: 0,
        }
    }
}

fn default_extend_after() -> f64 {
    0.5
}

fn default_max_extensions() -> u32 {
    3
}

impl RemoteConfig {
    /// Cache settings without a namespace; the service assigns one per provider.
    pub fn remote_cache_config(&self) -> RemoteCacheConfig {
        let client_side = (self.client_side_entries > 0).then(|| ClientSideConfig {
            max_entries: self.client_side_entries,
            ..ClientSideConfig::default()
        });
        RemoteCacheConfig::default()
            .ttl(Duration::from_secs(self.ttl_secs))
            .extend_after((self.extend_after > 0.0).then_some(self.extend_after))
            .max_extensions(self.max_extensions)
            .client_side(client_side)
    }
}

/// Provider configurations. A provider is enabled when its section is
/// present and its keys are available.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub unsplash: Option<UnsplashConfig>,
    #[serde(default)]
    pub tenor: Option<TenorConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnsplashConfig {
    /// Application name used in attribution links.
    #[serde(default)]
    pub app_name: Option<String>,
    /// API base URL override.
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenorConfig {
    /// API base URL override.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub unsplash: Option<UnsplashSecret>,
    #[serde(default)]
    pub tenor: Option<TenorSecret>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnsplashSecret {
    pub access_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenorSecret {
    pub api_key: String,
    pub client_key: String,
}

const UNSPLASH_ACCESS_KEY_ENV: &str = "UNSPLASH_ACCESS_KEY";
const TENOR_API_KEY_ENV: &str = "TENOR_API_KEY";
const TENOR_CLIENT_KEY_ENV: &str = "TENOR_CLIENT_KEY";

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Otherwise the first of
    /// `~/.kitten/config.toml` and `/etc/kitten/config.toml` is used, and
    /// defaults apply when neither exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let Some(path) = Self::resolve_config_path(explicit_path)? else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(&path).map_err(|e| {
            KittenError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            KittenError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(KittenError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".kitten").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/kitten/config.toml");
        Ok(system_config.exists().then_some(system_config))
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (keys may come from env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".kitten").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/kitten/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load a secrets file, rejecting it unless only its owner can read it.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            KittenError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            KittenError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            KittenError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(KittenError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Unsplash access key, falling back to `UNSPLASH_ACCESS_KEY`.
    pub fn unsplash_key(&self) -> Option<String> {
        self.unsplash
            .as_ref()
            .map(|s| s.access_key.clone())
            .or_else(|| env_var(UNSPLASH_ACCESS_KEY_ENV))
    }

    /// Tenor API and client keys, falling back to `TENOR_API_KEY` and
    /// `TENOR_CLIENT_KEY`.
    pub fn tenor_keys(&self) -> Option<(String, String)> {
        if let Some(tenor) = &self.tenor {
            return Some((tenor.api_key.clone(), tenor.client_key.clone()));
        }
        Some((env_var(TENOR_API_KEY_ENV)?, env_var(TENOR_CLIENT_KEY_ENV)?))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
