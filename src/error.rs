//! Kitten error types

use std::time::Duration;

/// Kitten error types
#[derive(Debug, thiserror::Error)]
pub enum KittenError {
    // Request errors
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    // Upstream errors
    #[error("fetch `{url}`: {message}")]
    Fetch { url: String, message: String },

    /// Source body exceeded the configured maximum size.
    #[error("body exceeded the {limit} bytes limit")]
    BodyTooLarge { limit: u64 },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    // Rendering errors, tagged with the pipeline stage that failed
    #[error("decode {stage}: {message}")]
    Decode { stage: &'static str, message: String },

    #[error("encode {stage}: {message}")]
    Encode { stage: &'static str, message: String },

    #[error("font error: {0}")]
    Font(String),

    /// A frame compositing task failed; the whole animation is discarded.
    #[error("frame {index}: {message}")]
    FrameTask { index: usize, message: String },

    // Cache errors (recovered locally by callers, never surfaced to clients)
    #[error("cache error: {0}")]
    Cache(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl KittenError {
    /// HTTP-equivalent status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            KittenError::BadInput(_) => 400,
            KittenError::NotFound(_) => 404,
            KittenError::RateLimited { .. } => 429,
            KittenError::Fetch { .. } | KittenError::BodyTooLarge { .. } => 502,
            KittenError::Api { status, .. } if *status == 404 => 404,
            KittenError::Api { .. } => 502,
            _ => 500,
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_transient(&self) -> bool {
        match self {
            KittenError::RateLimited { .. } => true,
            KittenError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Retry hint carried by a `RateLimited` error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            KittenError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for KittenError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        if err.status().map(|s| s.as_u16()) == Some(429) {
            KittenError::RateLimited { retry_after: None }
        } else {
            KittenError::Fetch {
                url,
                message: err.to_string(),
            }
        }
    }
}

/// Result type alias for Kitten operations
pub type Result<T> = std::result::Result<T, KittenError>;
