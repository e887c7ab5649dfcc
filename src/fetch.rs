//! Source media fetching with a bounded body size.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::{KittenError, Result};

/// Largest source body accepted by default: 2 MiB.
pub const DEFAULT_MAX_BODY_SIZE: u64 = 2 << 20;

/// Fetch raw bytes from a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Bodies larger than this fail with [`KittenError::BodyTooLarge`]. Default: 2 MiB.
    pub max_body_size: u64,
    /// Whole-request timeout. Default: 30 seconds.
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            timeout: Duration::from_secs(30),
        }
    }
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_body_size(mut self, bytes: u64) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// reqwest-backed [`Fetcher`].
#[derive(Clone)]
pub struct HttpFetcher {
    http: Client,
    max_body_size: u64,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("kitten/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| KittenError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(http, config.max_body_size))
    }

    /// Reuse an existing client.
    pub fn with_client(http: Client, max_body_size: u64) -> Self {
        Self {
            http,
            max_body_size,
        }
    }

    pub fn max_body_size(&self) -> u64 {
        self.max_body_size
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                404 => KittenError::NotFound(url.to_string()),
                429 => KittenError::RateLimited {
                    retry_after: retry_after(response.headers()),
                },
                _ => KittenError::Fetch {
                    url: url.to_string(),
                    message: format!("unexpected status {status}"),
                },
            });
        }

        let limit = self.max_body_size;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(KittenError::BodyTooLarge { limit });
        }

        // Content-Length may be absent or wrong; enforce the limit on the stream too.
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() as u64 + chunk.len() as u64 > limit {
                return Err(KittenError::BodyTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
