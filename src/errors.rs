//! Error types for Artifact Fetcher
//!
//! This module defines the error types for all components of the application.
//! Per-key failures (malformed keys, cache I/O) are converted into reported
//! outcomes by the orchestrator; only acquisition failures and interruption
//! surface as a failed run.

use std::path::PathBuf;
use thiserror::Error;

/// Rule key parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Key has the wrong number of characters
    #[error("Invalid rule key '{key}': expected {expected} hex characters, got {actual}")]
    InvalidLength {
        key: String,
        expected: usize,
        actual: usize,
    },

    /// Key contains characters outside [0-9a-fA-F]
    #[error("Invalid rule key '{key}': contains non-hexadecimal characters")]
    InvalidCharacter { key: String },
}

/// Artifact cache client errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// I/O error while reading or materializing an artifact
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP request to artifact cache failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an unexpected status
    #[error("Artifact cache server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Invalid cache URL
    #[error("Invalid cache URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Cache directory not found or inaccessible
    #[error("Cache directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// Rate limiter could not be built from configuration
    #[error("Invalid rate limit for artifact cache: {reason}")]
    RateLimiterSetup { reason: String },

    /// No backend configured
    #[error("No artifact cache configured. Use --dir-cache or --http-cache, or set [cache] in the config file")]
    NotConfigured,
}

/// Fetch orchestration errors
#[derive(Error, Debug)]
pub enum FetchError {
    /// The caller supplied no keys
    #[error("No cache keys specified.")]
    NoKeysProvided,

    /// A key could not be parsed
    #[error(transparent)]
    InvalidKeyFormat(#[from] KeyError),

    /// Cache client failure
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Run was cancelled by a shutdown request
    #[error("Fetch interrupted: {reason}")]
    Interrupted { reason: String },

    /// Run exceeded the configured fetch timeout
    #[error("Fetch timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Orchestrator configuration rejected
    #[error("Invalid fetch configuration: {reason}")]
    InvalidConfig { reason: String },

    /// I/O error writing status lines
    #[error("Failed to write status output")]
    StatusOutput(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Could not determine the user config directory
    #[error("Could not determine user config directory")]
    NoConfigDirectory,

    /// I/O error reading or writing configuration
    #[error("Configuration I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Progress reporting errors
#[derive(Error, Debug)]
pub enum ProgressError {
    /// Terminal output error
    #[error("Terminal output error")]
    TerminalError(#[from] std::io::Error),

    /// Progress template could not be parsed
    #[error("Progress template error: {reason}")]
    TemplateError { reason: String },

    /// Snapshot could not be appended to the progress log
    #[error("Failed to write progress log {path}: {reason}")]
    LogWrite { path: PathBuf, reason: String },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Key error
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Cache error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Fetch error
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Progress error
    #[error(transparent)]
    Progress(#[from] ProgressError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Cache(CacheError::Http(_))
            | AppError::Cache(CacheError::ServerError { .. })
            | AppError::Fetch(FetchError::Cache(CacheError::Http(_)))
            | AppError::Fetch(FetchError::Timeout { .. }) => true,

            AppError::Key(_)
            | AppError::Fetch(FetchError::NoKeysProvided)
            | AppError::Fetch(FetchError::InvalidKeyFormat(_))
            | AppError::Config(ConfigError::InvalidFormat(_)) => false,

            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Key(_) => "key",
            AppError::Cache(_) => "cache",
            AppError::Fetch(_) => "fetch",
            AppError::Config(_) => "config",
            AppError::Progress(_) => "progress",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Rule key result type alias
pub type KeyResult<T> = std::result::Result<T, KeyError>;

/// Artifact cache client result type alias
pub type ArtifactCacheResult<T> = std::result::Result<T, CacheError>;

/// Fetch result type alias
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Progress result type alias
pub type ProgressResult<T> = std::result::Result<T, ProgressError>;
