//! Local directory artifact cache
//!
//! Artifacts live at `<root>/<k[0..2]>/<k[2..4]>/<key>` so no single
//! directory grows too large. A hit copies the artifact to the requested
//! destination using a temp file and rename.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{temp_file_for, ArtifactCache};
use crate::app::lazy_path::LazyPath;
use crate::app::models::{CacheMode, CacheResult};
use crate::app::rule_key::RuleKey;
use crate::errors::{ArtifactCacheResult, CacheError};

/// Artifact cache backed by a local directory tree
#[derive(Debug)]
pub struct DirArtifactCache {
    root: PathBuf,
    closed: AtomicBool,
}

impl DirArtifactCache {
    /// Open a directory cache rooted at `root`
    ///
    /// # Errors
    ///
    /// Returns `CacheError::DirectoryNotAccessible` if `root` is not an
    /// existing directory.
    pub fn open(root: PathBuf) -> ArtifactCacheResult<Self> {
        if !root.is_dir() {
            return Err(CacheError::DirectoryNotAccessible { path: root });
        }
        debug!("Opened directory cache at {}", root.display());
        Ok(Self {
            root,
            closed: AtomicBool::new(false),
        })
    }

    /// Cache root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `key` is stored inside the cache
    pub fn artifact_path(&self, key: &RuleKey) -> PathBuf {
        let hex = key.to_hex();
        self.root.join(&hex[0..2]).join(&hex[2..4]).join(&hex)
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactCache for DirArtifactCache {
    async fn fetch(
        &self,
        key: &RuleKey,
        destination: &LazyPath,
    ) -> ArtifactCacheResult<CacheResult> {
        let source = self.artifact_path(key);

        match tokio::fs::metadata(&source).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Ok(CacheResult::miss()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Directory cache miss for {}", key);
                return Ok(CacheResult::miss());
            }
            Err(e) => return Err(CacheError::Io(e)),
        }

        let target = destination.get()?;
        let temp = temp_file_for(&target)?;

        tokio::fs::copy(&source, temp.path()).await?;
        temp.persist(&target).map_err(|e| CacheError::Io(e.error))?;

        debug!("Directory cache hit for {} -> {}", key, target.display());
        Ok(CacheResult::hit(CacheMode::Dir.as_str(), CacheMode::Dir))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            warn!("Directory cache at {} closed twice", self.root.display());
        }
    }

    fn mode(&self) -> CacheMode {
        CacheMode::Dir
    }
}
