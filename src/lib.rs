//! Artifact Fetcher Library
//!
//! A Rust library for fetching build artifacts from content-addressed caches
//! by rule key. Fetches run concurrently, every outcome is reported, and a
//! live listener renders progress from the events the fetches publish.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
