//! Prelude module for Artifact Fetcher Library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use artifact_fetcher::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use artifact_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bus = Arc::new(EventBus::new());
//!     let factory = Arc::new(CacheBackendFactory::new(CacheConfig::http("http://cache.local")));
//!     let orchestrator = FetchOrchestrator::new(FetchConfig::default(), factory, bus);
//!
//!     let keys = vec!["b64009ae3762a42a1651c139ec452f0d18f48e21".to_string()];
//!     let status = orchestrator.run(&keys, &mut std::io::stderr()).await;
//!     std::process::exit(status.code());
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Essential app components that are used in most integrations
pub use crate::app::{
    // Cache boundary
    ArtifactCache,
    ArtifactCacheFactory,
    CacheBackendFactory,
    CacheConfig,
    // Data types
    CacheMode,
    CacheResult,
    // Orchestration
    EventBus,
    ExitStatus,
    FetchConfig,
    FetchEvent,
    FetchEventListener,
    FetchOrchestrator,
    FetchOutcome,
    FetchSummary,
    LazyPath,
    // Progress
    LiveProgressListener,
    ProgressConfig,
    RuleKey,
    SummaryVerbosity,
};

// Commonly used constants
pub use crate::constants::{DEFAULT_MAX_CONCURRENT_FETCHES, RULE_KEY_HEX_LEN, USER_AGENT};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;
