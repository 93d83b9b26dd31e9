//! Deferred artifact destinations
//!
//! A [`LazyPath`] names where an artifact should land without touching the
//! filesystem. The path is only computed, and its parent directory only
//! created, when a cache backend actually has bytes to write. A miss therefore
//! leaves no trace on disk.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::constants::files;

type PathFactory = dyn Fn() -> io::Result<PathBuf> + Send + Sync;

/// Destination path realized on first use
///
/// Cloning is cheap and clones share the memoized value, so the factory runs
/// at most once successfully no matter how many holders call [`get`].
///
/// [`get`]: LazyPath::get
#[derive(Clone)]
pub struct LazyPath {
    inner: Arc<LazyInner>,
}

struct LazyInner {
    factory: Box<PathFactory>,
    realized: Mutex<Option<PathBuf>>,
}

impl LazyPath {
    /// Create a lazy path from a factory
    ///
    /// The factory may perform I/O (for example creating the parent
    /// directory). A failed factory call is not memoized, so a later `get`
    /// retries.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> io::Result<PathBuf> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(LazyInner {
                factory: Box::new(factory),
                realized: Mutex::new(None),
            }),
        }
    }

    /// Lazy path that resolves to a fixed location with no side effects
    pub fn of(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(move || Ok(path.clone()))
    }

    /// Realize the path, running the factory if it has not succeeded yet
    pub fn get(&self) -> io::Result<PathBuf> {
        let mut realized = self
            .inner
            .realized
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        if let Some(path) = realized.as_ref() {
            return Ok(path.clone());
        }

        let path = (self.inner.factory)()?;
        *realized = Some(path.clone());
        Ok(path)
    }

    /// Path if it has already been realized
    pub fn realized(&self) -> Option<PathBuf> {
        self.inner
            .realized
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Check whether any holder has realized the path
    pub fn is_realized(&self) -> bool {
        self.realized().is_some()
    }
}

impl fmt::Debug for LazyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.realized() {
            Some(path) => write!(f, "LazyPath({})", path.display()),
            None => f.write_str("LazyPath(<unrealized>)"),
        }
    }
}

/// Where fetched artifacts are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLocation {
    /// User-specified directory, created on first hit
    Fixed(PathBuf),
    /// Fresh temporary directory, created on first hit and kept afterwards
    Temporary,
}

/// Shared output directory that is created at most once
///
/// Every per-key [`LazyPath`] handed to a backend resolves through the same
/// `OutputDirectory`, so a run with only misses creates nothing, and a run
/// with hits creates exactly one directory.
#[derive(Debug)]
pub struct OutputDirectory {
    location: OutputLocation,
    resolved: Mutex<Option<PathBuf>>,
}

impl OutputDirectory {
    /// Create an output directory handle
    pub fn new(location: OutputLocation) -> Self {
        Self {
            location,
            resolved: Mutex::new(None),
        }
    }

    /// Output directory rooted at a fixed path
    pub fn fixed(path: impl Into<PathBuf>) -> Self {
        Self::new(OutputLocation::Fixed(path.into()))
    }

    /// Output directory in a new temporary location
    pub fn temporary() -> Self {
        Self::new(OutputLocation::Temporary)
    }

    /// Configured location
    pub fn location(&self) -> &OutputLocation {
        &self.location
    }

    /// Directory path if it has been created
    pub fn resolved(&self) -> Option<PathBuf> {
        self.resolved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Create the directory if needed and return its path
    pub fn resolve(&self) -> io::Result<PathBuf> {
        let mut resolved = self.resolved.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(path) = resolved.as_ref() {
            return Ok(path.clone());
        }

        let path = match &self.location {
            OutputLocation::Fixed(path) => {
                ensure_directory_exists(path)?;
                path.clone()
            }
            OutputLocation::Temporary => tempfile::Builder::new()
                .prefix(files::OUTPUT_DIR_PREFIX)
                .tempdir()?
                .into_path(),
        };

        debug!("Output directory ready at {}", path.display());
        *resolved = Some(path.clone());
        Ok(path)
    }

    /// Lazy destination for one artifact file inside this directory
    pub fn lazy_path_for(self: &Arc<Self>, file_name: impl Into<String>) -> LazyPath {
        let dir = Arc::clone(self);
        let file_name = file_name.into();
        LazyPath::new(move || Ok(dir.resolve()?.join(&file_name)))
    }
}

/// Ensure a directory exists, creating it and any parents if necessary
pub fn ensure_directory_exists(path: &Path) -> io::Result<()> {
    if !path.exists() {
        debug!("Creating directory: {}", path.display());
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
