//! Content-addressed artifact keys.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::types::{CaptionRequest, MediaKind};

/// Deterministic digest over `(subject id, search term, caption)` plus the
/// media kind.
///
/// Each field is length-prefixed before hashing so that moving characters
/// between fields always changes the digest, and the search term carries a
/// presence byte so an absent term never collides with an empty one. The
/// kind is part of the file name, which keeps identical key material for
/// images and GIFs apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: String,
    kind: MediaKind,
}

impl CacheKey {
    /// Key for a render of `caption` over subject `id`. Inputs are trimmed;
    /// case is preserved.
    pub fn new(kind: MediaKind, id: &str, search: Option<&str>, caption: &str) -> Self {
        let mut hasher = Sha256::new();
        hash_field(&mut hasher, id.trim());
        match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(search) => {
                hasher.update([1u8]);
                hash_field(&mut hasher, search);
            }
            None => hasher.update([0u8]),
        }
        hash_field(&mut hasher, caption.trim());

        Self {
            digest: hex::encode(hasher.finalize()),
            kind,
        }
    }

    pub fn for_request(request: &CaptionRequest) -> Self {
        Self::new(
            request.kind(),
            request.subject_id(),
            request.search(),
            request.caption(),
        )
    }

    /// Lowercase hex SHA-256.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// `<digest>.<extension>`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.digest, self.kind.extension())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.digest)
    }
}

fn hash_field(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}
