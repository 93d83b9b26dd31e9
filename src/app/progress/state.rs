//! Counters and timestamps the live listener maintains from fetch events
//!
//! A [`ProgressState`] is only ever touched under the listener's single
//! mutex, so one event is applied as one indivisible update and a render
//! never sees a hit counted without its in-flight entry removed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::app::models::{CacheResult, CacheResultKind, FetchEvent, FetchEventKind};

/// Whether the listener has seen any activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListenerPhase {
    /// No event received yet
    Idle,
    /// At least one event received
    Active,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub started: usize,
    pub hit: usize,
    pub miss: usize,
    pub error: usize,
    /// Fetches started but not yet finished
    pub in_flight: usize,
    pub bytes_downloaded: u64,
}

impl ProgressCounters {
    /// Keys that have settled
    pub fn finished(&self) -> usize {
        self.hit + self.miss + self.error
    }

    /// Keys seen so far, settled or not
    pub fn total(&self) -> usize {
        self.finished() + self.in_flight
    }

    /// Keys that missed or errored
    pub fn failed(&self) -> usize {
        self.miss + self.error
    }
}

/// Settled artifact kept for detail lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedArtifact {
    pub key: String,
    pub result: CacheResult,
    pub duration_ms: u64,
    pub size: Option<u64>,
}

/// Mutable progress state owned by the live listener
#[derive(Debug, Clone, Default)]
pub struct ProgressState {
    counters: ProgressCounters,
    first_event_millis: Option<u64>,
    last_event_millis: Option<u64>,
    /// Start times of outstanding fetches per key; a key may be fetched
    /// more than once at the same time
    in_flight: BTreeMap<String, Vec<u64>>,
    finished: Vec<FinishedArtifact>,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the state
    pub fn apply(&mut self, event: &FetchEvent) {
        let at = event.timestamp_millis;
        self.first_event_millis = Some(self.first_event_millis.map_or(at, |t| t.min(at)));
        self.last_event_millis = Some(self.last_event_millis.map_or(at, |t| t.max(at)));

        match &event.kind {
            FetchEventKind::Started { key } => {
                self.counters.started += 1;
                self.in_flight.entry(key.clone()).or_default().push(at);
            }
            FetchEventKind::Finished(outcome) => {
                let key = outcome.display_key();
                if let Some(starts) = self.in_flight.get_mut(&key) {
                    starts.remove(0);
                    if starts.is_empty() {
                        self.in_flight.remove(&key);
                    }
                }

                match outcome.result.kind() {
                    CacheResultKind::Hit => self.counters.hit += 1,
                    CacheResultKind::Miss => self.counters.miss += 1,
                    CacheResultKind::Error => self.counters.error += 1,
                }
                self.counters.bytes_downloaded += outcome.artifact_size.unwrap_or(0);

                self.finished.push(FinishedArtifact {
                    key,
                    result: outcome.result.clone(),
                    duration_ms: outcome.duration_ms,
                    size: outcome.artifact_size,
                });
            }
        }
        self.counters.in_flight = self.in_flight.values().map(Vec::len).sum();
    }

    pub fn phase(&self) -> ListenerPhase {
        if self.first_event_millis.is_some() {
            ListenerPhase::Active
        } else {
            ListenerPhase::Idle
        }
    }

    pub fn counters(&self) -> ProgressCounters {
        self.counters
    }

    pub fn first_event_millis(&self) -> Option<u64> {
        self.first_event_millis
    }

    pub fn last_event_millis(&self) -> Option<u64> {
        self.last_event_millis
    }

    /// In-flight fetches with their start times, ordered by key
    pub fn in_flight(&self) -> impl Iterator<Item = (&str, u64)> {
        self.in_flight
            .iter()
            .flat_map(|(k, starts)| starts.iter().map(move |t| (k.as_str(), *t)))
    }

    /// Settled artifacts in completion order
    pub fn finished(&self) -> &[FinishedArtifact] {
        &self.finished
    }

    /// Whether any fetch is still outstanding
    pub fn has_outstanding(&self) -> bool {
        !self.in_flight.is_empty()
    }
}
