//! Per-run fetch summary
//!
//! Collects the ordered outcomes of one run and derives the counts and the
//! process exit status from them.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::models::{CacheResultKind, ExitStatus, FetchOutcome};

/// Final result of a fetch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSummary {
    /// One outcome per requested key, in input order
    pub outcomes: Vec<FetchOutcome>,
    /// Why the run was cut short, if it was
    pub interruption: Option<String>,
    /// Wall time of the whole run
    pub total_duration: Duration,
}

impl FetchSummary {
    /// Create a summary from ordered outcomes
    pub fn new(outcomes: Vec<FetchOutcome>, total_duration: Duration) -> Self {
        Self {
            outcomes,
            interruption: None,
            total_duration,
        }
    }

    /// Mark the run as interrupted
    pub fn with_interruption(mut self, reason: impl Into<String>) -> Self {
        self.interruption = Some(reason.into());
        self
    }

    /// Number of keys requested
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of hits
    pub fn hit_count(&self) -> usize {
        self.count(CacheResultKind::Hit)
    }

    /// Number of misses
    pub fn miss_count(&self) -> usize {
        self.count(CacheResultKind::Miss)
    }

    /// Number of errors, including malformed and interrupted keys
    pub fn error_count(&self) -> usize {
        self.count(CacheResultKind::Error)
    }

    /// Bytes written for all hits, counting a repeated key once
    pub fn downloaded_bytes(&self) -> u64 {
        let mut seen = HashSet::new();
        self.outcomes
            .iter()
            .filter(|o| o.rule_key.map_or(true, |key| seen.insert(key)))
            .filter_map(|o| o.artifact_size)
            .sum()
    }

    /// Whether the run was interrupted
    pub fn was_interrupted(&self) -> bool {
        self.interruption.is_some()
    }

    /// Success only when at least one key was requested and every key hit
    pub fn exit_status(&self) -> ExitStatus {
        let all_hit = !self.outcomes.is_empty() && self.outcomes.iter().all(FetchOutcome::is_hit);
        if all_hit && !self.was_interrupted() {
            ExitStatus::Success
        } else {
            ExitStatus::Failure
        }
    }

    fn count(&self, kind: CacheResultKind) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.result.kind() == kind)
            .count()
    }
}
