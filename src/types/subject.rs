//! Metadata about a captionable subject, as resolved from an upstream API.

use serde::{Deserialize, Serialize};

/// What an upstream provider knows about a subject.
///
/// Only `source_url` matters for rendering; the remaining fields are kept
/// so attribution and usage notifications can be sent without another
/// lookup. This is the value type stored in the remote cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectMetadata {
    pub id: String,
    /// URL of the raw media to caption.
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_url: Option<String>,
    /// Endpoint to ping when the subject is used (download or share events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_url: Option<String>,
}

impl SubjectMetadata {
    pub fn new(id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
            page_url: None,
            author: None,
            author_url: None,
            notify_url: None,
        }
    }

    pub fn with_page_url(mut self, url: impl Into<String>) -> Self {
        self.page_url = Some(url.into());
        self
    }

    pub fn with_author(mut self, name: impl Into<String>, url: Option<String>) -> Self {
        self.author = Some(name.into());
        self.author_url = url;
        self
    }

    pub fn with_notify_url(mut self, url: impl Into<String>) -> Self {
        self.notify_url = Some(url.into());
        self
    }
}

/// One search result and where to continue from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub subject: SubjectMetadata,
    /// Cursor for the next result, for providers that page their results.
    pub next: Option<String>,
}

impl SearchHit {
    pub fn new(subject: SubjectMetadata) -> Self {
        Self {
            subject,
            next: None,
        }
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }
}
