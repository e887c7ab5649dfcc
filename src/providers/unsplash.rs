//! Unsplash photo API client.
//!
//! See: <https://unsplash.com/documentation>

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use super::traits::SubjectResolver;
use crate::fetch::retry_after;
use crate::types::{SearchHit, SubjectMetadata};
use crate::{KittenError, Result};

/// Default base URL for the Unsplash API
const DEFAULT_BASE_URL: &str = "https://api.unsplash.com";

/// Rendition requested from the raw photo URL.
const RAW_PARAMS: &str = "fm=jpeg&w=800&fit=clip";

/// Client for the Unsplash photo API.
#[derive(Clone)]
pub struct UnsplashClient {
    access_key: String,
    app_name: String,
    http: Client,
    base_url: String,
}

impl UnsplashClient {
    /// Create a client with the given access key.
    pub fn new(access_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(access_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        access_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| KittenError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            access_key: access_key.into().trim().to_string(),
            app_name: "kitten".to_string(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Application name used in attribution links. Default: `kitten`.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    fn authorization(&self) -> String {
        format!("Client-ID {}", self.access_key)
    }

    fn photo_url(&self, id: &str) -> Result<Url> {
        self.endpoint(&["photos", id])
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| KittenError::Configuration(format!("invalid Unsplash base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| KittenError::Configuration("Unsplash base URL cannot have a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Append referral tracking to an attribution link.
    fn referral(&self, link: &str) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("utm_source", &self.app_name);
        query.append_pair("utm_medium", "referral");
        format!("{link}?{}", query.finish())
    }

    /// Map a failed response to the crate taxonomy. `what` names the
    /// requested resource in `NotFound` messages.
    async fn check(&self, response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry = retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            404 => Err(KittenError::NotFound(format!("unsplash {what}"))),
            403 | 429 => Err(KittenError::RateLimited { retry_after: retry }),
            _ if body.contains("Rate Limit Exceeded") => {
                Err(KittenError::RateLimited { retry_after: retry })
            }
            code => Err(KittenError::Api {
                status: code,
                message: format!("Unsplash API error: {status}"),
            }),
        }
    }

    async fn fetch_photo(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<SubjectMetadata> {
        let response = request
            .header("Authorization", self.authorization())
            .send()
            .await?;

        let photo: Photo = self.check(response, what).await?.json().await?;
        if photo.urls.get("raw").is_none_or(|raw| raw.is_empty()) {
            return Err(KittenError::Api {
                status: 200,
                message: format!("unsplash {what} has no raw URL"),
            });
        }
        Ok(self.to_metadata(photo))
    }

    fn to_metadata(&self, photo: Photo) -> SubjectMetadata {
        let raw = photo.urls.get("raw").cloned().unwrap_or_default();
        let mut subject = SubjectMetadata::new(photo.id, format!("{raw}?{RAW_PARAMS}"));

        if let Some(page) = photo.links.get("html") {
            subject = subject.with_page_url(self.referral(page));
        }
        if let Some(name) = photo.user.name.filter(|n| !n.is_empty()) {
            let profile = photo.user.links.get("html").map(|l| self.referral(l));
            subject = subject.with_author(name, profile);
        }
        if let Some(download) = photo.links.get("download_location") {
            subject = subject.with_notify_url(download.clone());
        }
        subject
    }
}

#[async_trait]
impl SubjectResolver for UnsplashClient {
    fn name(&self) -> &str {
        "unsplash"
    }

    async fn resolve(&self, id: &str) -> Result<SubjectMetadata> {
        let request = self.http.get(self.photo_url(id)?);
        self.fetch_photo(request, &format!("photo `{id}`")).await
    }

    /// One random landscape photo matching `query`. Unsplash does not page
    /// random results, so the hit carries no cursor.
    async fn search(&self, query: &str, _cursor: Option<&str>) -> Result<SearchHit> {
        let request = self
            .http
            .get(self.endpoint(&["photos", "random"])?)
            .query(&[("query", query), ("orientation", "landscape")]);
        let subject = self
            .fetch_photo(request, &format!("photo matching `{query}`"))
            .await?;
        debug!(query, id = %subject.id, "unsplash search hit");
        Ok(SearchHit::new(subject))
    }

    /// Triggers the Unsplash download event required by the API guidelines.
    async fn notify_used(&self, subject: &SubjectMetadata, _search: Option<&str>) -> Result<()> {
        let Some(url) = &subject.notify_url else {
            return Ok(());
        };
        let response = self
            .http
            .get(url)
            .header("Authorization", self.authorization())
            .send()
            .await?;
        self.check(response, &format!("photo `{}`", subject.id)).await?;
        debug!(id = %subject.id, "sent unsplash download event");
        Ok(())
    }
}

#[derive(Deserialize)]
struct Photo {
    id: String,
    #[serde(default)]
    urls: HashMap<String, String>,
    #[serde(default)]
    links: HashMap<String, String>,
    #[serde(default)]
    user: User,
}

#[derive(Deserialize, Default)]
struct User {
    name: Option<String>,
    #[serde(default)]
    links: HashMap<String, String>,
}
