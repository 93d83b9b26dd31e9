//! Artifact cache clients
//!
//! The orchestrator talks to caches only through the [`ArtifactCache`] trait.
//! A cache is acquired through an [`ArtifactCacheFactory`] so that a run with
//! nothing to fetch never opens (and never has to close) a connection, and
//! it is released through a [`CacheLease`] which closes it exactly once.
//!
//! # Module Organization
//!
//! - [`config`] - Backend selection and HTTP client settings
//! - [`dir`] - Local directory cache
//! - [`http`] - Remote HTTP cache
//!
//! # Examples
//!
//! ```rust,no_run
//! use artifact_fetcher::app::cache::{ArtifactCacheFactory, CacheBackendFactory, CacheConfig};
//! use artifact_fetcher::app::{LazyPath, RuleKey};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = CacheBackendFactory::new(CacheConfig::dir("/var/cache/artifacts"));
//! let cache = factory.open()?;
//!
//! let key = RuleKey::from_hex("b64009ae3762a42a1651c139ec452f0d18f48e21")?;
//! let result = cache.fetch(&key, &LazyPath::of("/tmp/artifact")).await?;
//! println!("{}", result);
//! cache.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dir;
pub mod http;

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::app::lazy_path::LazyPath;
use crate::app::models::{CacheMode, CacheResult};
use crate::app::rule_key::RuleKey;
use crate::constants::files;
use crate::errors::{ArtifactCacheResult, CacheError};

pub use config::{CacheBackend, CacheConfig, HttpClientConfig};
pub use dir::DirArtifactCache;
pub use http::HttpArtifactCache;

/// Client for a content-addressed artifact cache
///
/// Implementations must be safe to call `fetch` on from many tasks at once.
/// `fetch` only realizes `destination` when it has an artifact to write.
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    /// Look up `key` and, on a hit, materialize the artifact at `destination`
    async fn fetch(&self, key: &RuleKey, destination: &LazyPath)
        -> ArtifactCacheResult<CacheResult>;

    /// Release the client's resources. Called once, after all fetches settle.
    fn close(&self);

    /// Which kind of backend this is
    fn mode(&self) -> CacheMode;
}

/// Deferred acquisition of an artifact cache
pub trait ArtifactCacheFactory: Send + Sync {
    /// Open a cache client
    fn open(&self) -> ArtifactCacheResult<Arc<dyn ArtifactCache>>;
}

/// Ownership guard that closes a cache when dropped
///
/// Fetch tasks borrow the cache through [`CacheLease::cache`]. The lease
/// itself is held by the orchestrator and dropped after every task has
/// been joined or aborted.
pub struct CacheLease {
    cache: Arc<dyn ArtifactCache>,
}

impl CacheLease {
    /// Take ownership of an opened cache
    pub fn new(cache: Arc<dyn ArtifactCache>) -> Self {
        debug!("Leased {} artifact cache", cache.mode());
        Self { cache }
    }

    /// Shared handle for issuing fetches
    pub fn cache(&self) -> Arc<dyn ArtifactCache> {
        Arc::clone(&self.cache)
    }

    /// Close the cache now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for CacheLease {
    fn drop(&mut self) {
        info!("Closing {} artifact cache", self.cache.mode());
        self.cache.close();
    }
}

/// Factory that builds one of the bundled backends from configuration
#[derive(Debug, Clone)]
pub struct CacheBackendFactory {
    config: CacheConfig,
}

impl CacheBackendFactory {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl ArtifactCacheFactory for CacheBackendFactory {
    fn open(&self) -> ArtifactCacheResult<Arc<dyn ArtifactCache>> {
        match &self.config.backend {
            Some(CacheBackend::Dir { root }) => {
                Ok(Arc::new(DirArtifactCache::open(root.clone())?))
            }
            Some(CacheBackend::Http { base_url }) => Ok(Arc::new(HttpArtifactCache::open(
                base_url,
                &self.config.http,
            )?)),
            None => Err(CacheError::NotConfigured),
        }
    }
}

/// Uniquely named sibling file an artifact is written to before being
/// persisted over `destination`
///
/// The file is removed when dropped, so an abandoned write leaves nothing
/// behind.
pub(crate) fn temp_file_for(destination: &Path) -> io::Result<NamedTempFile> {
    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut prefix = OsString::from(".");
    if let Some(name) = destination.file_name() {
        prefix.push(name);
        prefix.push(".");
    }

    tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(files::TEMP_FILE_SUFFIX)
        .tempfile_in(parent)
}
