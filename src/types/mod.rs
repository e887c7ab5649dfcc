//! Public types for the Kitten API.

mod artifact;
mod request;
mod subject;

pub use artifact::RenderedArtifact;
pub use request::{CaptionRequest, DEFAULT_CACHE_TTL, MediaKind, cache_control_header};
pub use subject::{SearchHit, SubjectMetadata};
