//! Rendered artifacts.

use std::sync::Arc;

use super::MediaKind;

/// Encoded output of one render: JPEG bytes for images, GIF bytes for
/// animations.
///
/// The payload is shared behind an `Arc` and never mutated once built, so
/// handing a copy to the background cache writer is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    kind: MediaKind,
    bytes: Arc<[u8]>,
}

impl RenderedArtifact {
    pub fn new(kind: MediaKind, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            kind,
            bytes: bytes.into(),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the payload.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn content_type(&self) -> &'static str {
        self.kind.content_type()
    }
}
