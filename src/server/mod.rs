//! HTTP surface for kittend.
//!
//! This module provides:
//! - Configuration types and loading (`config`)
//! - The axum router serving rendered artifacts (`http`)

pub mod config;
pub mod http;

pub use http::router;
