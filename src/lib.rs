//! Kitten - caption rendering and caching engine
//!
//! This crate draws outlined captions onto still images and animated GIFs
//! and caches what it renders at two tiers: encoded artifacts on local disk,
//! and upstream subject metadata in a shared key-value store.
//!
//! # Service Example
//!
//! ```rust,no_run
//! use kitten::{CaptionRequest, Kitten, MediaKind};
//!
//! #[tokio::main]
//! async fn main() -> kitten::Result<()> {
//!     let service = Kitten::builder()
//!         .unsplash("your-access-key")
//!         .artifact_dir("/var/cache/kitten")
//!         .build()?;
//!
//!     let request = CaptionRequest::new("abc123", "hello world", MediaKind::Image)?;
//!     let artifact = service.render(&request).await?;
//!
//!     println!("{} bytes of {}", artifact.len(), artifact.content_type());
//!     Ok(())
//! }
//! ```
//!
//! # Offline Example
//!
//! ```rust,no_run
//! use kitten::{Kitten, MediaKind};
//!
//! #[tokio::main]
//! async fn main() -> kitten::Result<()> {
//!     let service = Kitten::builder().disable_artifact_cache().build()?;
//!
//!     let gif = std::fs::read("cat.gif").expect("read input");
//!     let captioned = service.render_bytes(MediaKind::Gif, gif, "TEST").await?;
//!
//!     std::fs::write("cat-captioned.gif", captioned.bytes()).expect("write output");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod fetch;
pub mod providers;
pub mod render;
#[cfg(feature = "server")]
pub mod server;
pub mod service;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use error::{KittenError, Result};
pub use service::{CaptionService, Kitten, KittenBuilder, SearchOutcome};
pub use version::{PKG_VERSION, version_string};

pub use types::{
    CaptionRequest, DEFAULT_CACHE_TTL, MediaKind, RenderedArtifact, SearchHit, SubjectMetadata,
    cache_control_header,
};
