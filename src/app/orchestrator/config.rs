//! Configuration for the fetch orchestrator
//!
//! Controls how many fetches run at once, how long a run may take and where
//! fetched artifacts are written.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::fetch;

/// Configuration for the fetch orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum number of fetches in flight at once
    pub max_concurrent_fetches: usize,
    /// Abort the whole run after this long
    #[serde(default, with = "humantime_serde")]
    pub fetch_timeout: Option<Duration>,
    /// Directory artifacts are written to (temporary directory if None)
    pub output_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: fetch::DEFAULT_MAX_CONCURRENT_FETCHES,
            fetch_timeout: None,
            output_dir: None,
        }
    }
}

impl FetchConfig {
    /// Set the concurrency limit
    pub fn with_max_concurrent_fetches(mut self, count: usize) -> Self {
        self.max_concurrent_fetches = count;
        self
    }

    /// Set the overall run timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Write artifacts into a fixed directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_fetches == 0 {
            return Err("Concurrent fetch limit cannot be zero".to_string());
        }

        if self.max_concurrent_fetches > fetch::MAX_CONCURRENT_FETCHES {
            return Err(format!(
                "Concurrent fetch limit {} exceeds maximum of {}",
                self.max_concurrent_fetches,
                fetch::MAX_CONCURRENT_FETCHES
            ));
        }

        if self.fetch_timeout.is_some_and(|t| t.is_zero()) {
            return Err("Fetch timeout cannot be zero".to_string());
        }

        Ok(())
    }
}
