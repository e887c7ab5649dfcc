//! Render requests and their wire encodings.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::{KittenError, Result};

/// How long clients and the remote tier may keep what we serve: 7 days.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// `Cache-Control` header value for a given TTL.
pub fn cache_control_header(ttl: Duration) -> String {
    format!("public, max-age={}", ttl.as_secs())
}

/// Kind of media a request renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Single-frame raster image, served as JPEG.
    Image,
    /// Animated GIF.
    Gif,
}

impl MediaKind {
    /// Parse the `kind` parameter.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "image" => Ok(MediaKind::Image),
            "gif" => Ok(MediaKind::Gif),
            other => Err(KittenError::BadInput(format!("unknown kind: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Gif => "gif",
        }
    }

    /// MIME type of the encoded artifact.
    pub fn content_type(&self) -> &'static str {
        match self {
            MediaKind::Image => "image/jpeg",
            MediaKind::Gif => "image/gif",
        }
    }

    /// File extension used by the artifact cache. Distinct per kind, so
    /// identical key material never collides across kinds.
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "jpeg",
            MediaKind::Gif => "gif",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One render: a subject, an optional search term and the caption to draw.
///
/// Validated on construction and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionRequest {
    subject_id: String,
    search: Option<String>,
    caption: String,
    kind: MediaKind,
}

impl CaptionRequest {
    /// Build a request, trimming inputs and rejecting empty `id`/`caption`.
    pub fn new(
        subject_id: impl AsRef<str>,
        caption: impl AsRef<str>,
        kind: MediaKind,
    ) -> Result<Self> {
        let subject_id = subject_id.as_ref().trim();
        if subject_id.is_empty() {
            return Err(KittenError::BadInput("id param is required".to_string()));
        }

        let caption = caption.as_ref().trim();
        if caption.is_empty() {
            return Err(KittenError::BadInput(
                "caption param is required".to_string(),
            ));
        }

        Ok(Self {
            subject_id: subject_id.to_string(),
            search: None,
            caption: caption.to_string(),
            kind,
        })
    }

    /// Attach the search term that led to this subject. Blank terms are dropped.
    pub fn with_search(mut self, search: impl AsRef<str>) -> Self {
        let search = search.as_ref().trim();
        self.search = (!search.is_empty()).then(|| search.to_string());
        self
    }

    /// Build a request from decoded query pairs. The first occurrence of
    /// each parameter wins.
    pub fn from_query<'a, I>(pairs: I, kind: MediaKind) -> Result<Self>
    where
        I: IntoIterator<Item = (Cow<'a, str>, Cow<'a, str>)>,
    {
        let mut id = None;
        let mut search = None;
        let mut caption = None;

        for (name, value) in pairs {
            let slot = match name.as_ref() {
                "id" => &mut id,
                "search" => &mut search,
                "caption" => &mut caption,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        let request = Self::new(
            id.unwrap_or_default(),
            caption.unwrap_or_default(),
            kind,
        )?;
        Ok(match search {
            Some(search) => request.with_search(search),
            None => request,
        })
    }

    /// Build a request from a raw `a=b&c=d` query string.
    pub fn from_query_string(query: &str, kind: MediaKind) -> Result<Self> {
        Self::from_query(url::form_urlencoded::parse(query.as_bytes()), kind)
    }

    /// Build a request from a request path carrying a base64url-encoded
    /// query string, falling back to `query` when the path is empty.
    pub fn from_path(path: &str, query: &str, kind: MediaKind) -> Result<Self> {
        let encoded = path.trim_start_matches('/');
        if encoded.is_empty() {
            return Self::from_query_string(query, kind);
        }

        let content = URL_SAFE
            .decode(encoded)
            .or_else(|_| URL_SAFE_NO_PAD.decode(encoded))
            .map_err(|e| KittenError::BadInput(format!("decode content: {e}")))?;
        let content = String::from_utf8(content)
            .map_err(|e| KittenError::BadInput(format!("parse content: {e}")))?;

        Self::from_query_string(&content, kind)
    }

    /// Base64url path segment that [`from_path`](Self::from_path) decodes
    /// back into this request.
    pub fn encoded_path(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("id", &self.subject_id);
        query.append_pair("caption", &self.caption);
        if let Some(search) = &self.search {
            query.append_pair("search", search);
        }
        URL_SAFE.encode(query.finish())
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }
}
