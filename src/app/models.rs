//! Data models for Artifact Fetcher
//!
//! This module defines the value types that flow between the cache clients,
//! the orchestrator and the progress listeners. Everything here is immutable
//! once constructed.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app::rule_key::RuleKey;
use crate::constants::messages;
use crate::errors::KeyError;

/// Backend that served a cache hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Local directory cache
    Dir,
    /// Remote HTTP cache
    Http,
}

impl CacheMode {
    /// Short lowercase name used in logs and detail lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dir => "dir",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome class of a single fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheResultKind {
    Hit,
    Miss,
    Error,
}

/// Classified result of a cache fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheResult {
    /// Artifact found and written to the destination
    Hit { source: String, mode: CacheMode },
    /// Artifact not present in the cache
    Miss,
    /// Fetch failed
    Error { reason: String },
}

impl CacheResult {
    /// Create a hit result
    pub fn hit(source: impl Into<String>, mode: CacheMode) -> Self {
        Self::Hit {
            source: source.into(),
            mode,
        }
    }

    /// Create a miss result
    pub fn miss() -> Self {
        Self::Miss
    }

    /// Create an error result
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    /// Outcome class of this result
    pub fn kind(&self) -> CacheResultKind {
        match self {
            Self::Hit { .. } => CacheResultKind::Hit,
            Self::Miss => CacheResultKind::Miss,
            Self::Error { .. } => CacheResultKind::Error,
        }
    }

    /// Check if this result is a hit
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }
}

impl fmt::Display for CacheResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit { source, mode } => write!(f, "HIT ({} via {})", source, mode),
            Self::Miss => f.write_str("MISS"),
            Self::Error { reason } => write!(f, "ERROR ({})", reason),
        }
    }
}

/// Settled result for one requested key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    /// Key exactly as the caller supplied it
    pub requested_key: String,
    /// Parsed key, `None` when the input was malformed
    pub rule_key: Option<RuleKey>,
    /// Classified fetch result
    pub result: CacheResult,
    /// Materialized artifact path, only set on a hit
    pub destination: Option<PathBuf>,
    /// Size of the materialized artifact in bytes, when known
    pub artifact_size: Option<u64>,
    /// Wall time spent on the fetch
    pub duration_ms: u64,
}

impl FetchOutcome {
    /// Create an outcome for a key that reached the cache
    pub fn new(rule_key: RuleKey, result: CacheResult, destination: Option<PathBuf>) -> Self {
        let destination = if result.is_hit() { destination } else { None };
        Self {
            requested_key: rule_key.to_hex(),
            rule_key: Some(rule_key),
            result,
            destination,
            artifact_size: None,
            duration_ms: 0,
        }
    }

    /// Create the outcome for a key that could not be parsed
    pub fn invalid_key(requested_key: impl Into<String>, error: &KeyError) -> Self {
        Self {
            requested_key: requested_key.into(),
            rule_key: None,
            result: CacheResult::error(error.to_string()),
            destination: None,
            artifact_size: None,
            duration_ms: 0,
        }
    }

    /// Create the outcome for a key whose fetch was cancelled
    pub fn interrupted(requested_key: impl Into<String>, rule_key: Option<RuleKey>) -> Self {
        Self {
            requested_key: requested_key.into(),
            rule_key,
            result: CacheResult::error(messages::INTERRUPTED_REASON),
            destination: None,
            artifact_size: None,
            duration_ms: 0,
        }
    }

    /// Attach the artifact size
    pub fn with_artifact_size(mut self, size: Option<u64>) -> Self {
        self.artifact_size = size;
        self
    }

    /// Attach the fetch duration
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Key used in user-facing lines: normalized hex when valid, raw input otherwise
    pub fn display_key(&self) -> String {
        match &self.rule_key {
            Some(key) => key.to_hex(),
            None => self.requested_key.clone(),
        }
    }

    /// Check if this outcome is a hit
    pub fn is_hit(&self) -> bool {
        self.result.is_hit()
    }

    /// The terminal status line reported for this key
    pub fn status_line(&self) -> String {
        let key = self.display_key();
        match (&self.result, &self.destination) {
            (CacheResult::Hit { .. }, Some(path)) => format!(
                "Successfully downloaded artifact with id {} at {}.",
                key,
                path.display()
            ),
            (CacheResult::Hit { source, .. }, None) => format!(
                "Successfully downloaded artifact with id {} from {}.",
                key, source
            ),
            (CacheResult::Miss, _) => {
                format!("Failed to retrieve an artifact with id {}.", key)
            }
            (CacheResult::Error { reason }, _) => format!(
                "Failed to retrieve an artifact with id {}. Reason: {}",
                key, reason
            ),
        }
    }
}

/// What happened to a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchEventKind {
    /// A fetch for this key was issued against the cache
    Started { key: String },
    /// The fetch settled
    Finished(FetchOutcome),
}

/// Event published on the bus for every fetch transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchEvent {
    pub kind: FetchEventKind,
    /// Milliseconds since the Unix epoch, from the orchestrator's clock
    pub timestamp_millis: u64,
}

impl FetchEvent {
    /// Event for a fetch being issued
    pub fn started(key: impl Into<String>, timestamp_millis: u64) -> Self {
        Self {
            kind: FetchEventKind::Started { key: key.into() },
            timestamp_millis,
        }
    }

    /// Event for a fetch settling
    pub fn finished(outcome: FetchOutcome, timestamp_millis: u64) -> Self {
        Self {
            kind: FetchEventKind::Finished(outcome),
            timestamp_millis,
        }
    }

    /// Key this event concerns, as displayed to users
    pub fn key(&self) -> String {
        match &self.kind {
            FetchEventKind::Started { key } => key.clone(),
            FetchEventKind::Finished(outcome) => outcome.display_key(),
        }
    }
}

/// Process exit status derived from a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    Success,
    Failure,
}

impl ExitStatus {
    /// Numeric process exit code
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }

    /// Check if the run succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
