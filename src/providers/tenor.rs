//! Tenor GIF API (v2) client.
//!
//! See: <https://developers.google.com/tenor/guides/quickstart>

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::traits::SubjectResolver;
use crate::fetch::retry_after;
use crate::types::{SearchHit, SubjectMetadata};
use crate::{KittenError, Result};

/// Default base URL for the Tenor API
const DEFAULT_BASE_URL: &str = "https://tenor.googleapis.com/v2";

/// Media formats tried in order when picking the source GIF.
const GIF_FORMATS: [&str; 3] = ["gif", "mediumgif", "tinygif"];

/// Client for the Tenor GIF API.
#[derive(Clone)]
pub struct TenorClient {
    api_key: String,
    client_key: String,
    http: Client,
    base_url: String,
}

impl TenorClient {
    /// Create a client with the given API key and client key.
    pub fn new(api_key: impl Into<String>, client_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, client_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        api_key: impl Into<String>,
        client_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| KittenError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.into().trim().to_string(),
            client_key: client_key.into().trim().to_string(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn handle_response_errors(&self, response: &reqwest::Response, what: &str) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        match status.as_u16() {
            404 => Err(KittenError::NotFound(format!("tenor {what}"))),
            429 => Err(KittenError::RateLimited {
                retry_after: retry_after(response.headers()),
            }),
            code => Err(KittenError::Api {
                status: code,
                message: format!("Tenor API error: {status}"),
            }),
        }
    }

    fn post_metadata(post: Post) -> Result<SubjectMetadata> {
        let source = GIF_FORMATS
            .iter()
            .find_map(|format| post.media_formats.get(*format))
            .map(|media| media.url.clone())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| KittenError::Api {
                status: 200,
                message: format!("tenor gif `{}` has no GIF rendition", post.id),
            })?;

        let mut subject = SubjectMetadata::new(post.id, source);
        if !post.url.is_empty() {
            subject = subject.with_page_url(post.url);
        }
        Ok(subject)
    }
}

#[async_trait]
impl SubjectResolver for TenorClient {
    fn name(&self) -> &str {
        "tenor"
    }

    async fn resolve(&self, id: &str) -> Result<SubjectMetadata> {
        let response = self
            .http
            .get(format!("{}/posts", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("client_key", self.client_key.as_str()),
                ("ids", id),
            ])
            .send()
            .await?;
        let what = format!("gif `{id}`");
        self.handle_response_errors(&response, &what)?;

        let posts: Posts = response.json().await?;
        let post = posts
            .results
            .into_iter()
            .next()
            .ok_or_else(|| KittenError::NotFound(format!("tenor {what}")))?;
        Self::post_metadata(post)
    }

    /// First GIF matching `query` from position `cursor`. The hit's `next`
    /// continues the same search; it is `None` on the last result.
    async fn search(&self, query: &str, cursor: Option<&str>) -> Result<SearchHit> {
        let mut params = vec![
            ("key", self.api_key.as_str()),
            ("client_key", self.client_key.as_str()),
            ("q", query),
            ("limit", "1"),
        ];
        if let Some(pos) = cursor.filter(|pos| !pos.is_empty()) {
            params.push(("pos", pos));
        }

        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&params)
            .send()
            .await?;
        let what = format!("gif matching `{query}`");
        self.handle_response_errors(&response, &what)?;

        let posts: Posts = response.json().await?;
        let next = posts.next.filter(|next| !next.is_empty());
        let post = posts
            .results
            .into_iter()
            .next()
            .ok_or_else(|| KittenError::NotFound(format!("tenor {what}")))?;

        let mut hit = SearchHit::new(Self::post_metadata(post)?);
        if let Some(next) = next {
            hit = hit.with_next(next);
        }
        debug!(query, id = %hit.subject.id, next = ?hit.next, "tenor search hit");
        Ok(hit)
    }

    /// Registers a share event, which Tenor uses to tune search ranking.
    async fn notify_used(&self, subject: &SubjectMetadata, search: Option<&str>) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/registershare", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("client_key", self.client_key.as_str()),
                ("id", subject.id.as_str()),
                ("q", search.unwrap_or_default()),
            ])
            .send()
            .await?;
        self.handle_response_errors(&response, &format!("gif `{}`", subject.id))?;
        debug!(id = %subject.id, "sent tenor share event");
        Ok(())
    }
}

#[derive(Deserialize)]
struct Posts {
    #[serde(default)]
    results: Vec<Post>,
    /// Search cursor; absent on lookups by id.
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize)]
struct Post {
    id: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    media_formats: HashMap<String, Media>,
}

#[derive(Deserialize)]
struct Media {
    url: String,
}
