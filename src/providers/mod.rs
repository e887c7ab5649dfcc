//! Upstream media providers.
//!
//! Each provider implements [`SubjectResolver`], turning a subject id into
//! the URL of the media to caption plus attribution details.

pub mod tenor;
pub mod traits;
pub mod unsplash;

pub use tenor::TenorClient;
pub use traits::SubjectResolver;
pub use unsplash::UnsplashClient;
