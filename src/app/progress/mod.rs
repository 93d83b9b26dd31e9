//! Live progress listener
//!
//! [`LiveProgressListener`] subscribes to the event bus and keeps a
//! [`ProgressState`] behind a single mutex. Fetch tasks update it from their
//! own threads while a display loop calls [`LiveProgressListener::render`] at
//! whatever cadence it likes. Rendering only reads, so calling it twice at
//! the same instant yields the same lines.
//!
//! # Rendered lines
//!
//! ```text
//! [+] FETCHING ARTIFACTS... 1.2s (started 12:34:56 +00:00)
//! Downloaded: 3/5 artifacts, 1.5 MB
//! Failed: 1 missed, 0 errored
//!  - b64009ae3762a42a1651c139ec452f0d18f48e21 ... 0.8s
//!  - 0123456789abcdef0123456789abcdef01234567 HIT via http 0.4s 512.0 KB
//! ```
//!
//! The header appears once any event has been seen and switches to
//! `[-] FETCHING ARTIFACTS...FINISHED` when nothing is in flight. The
//! download line is always present unless `hide_empty_download` is set and
//! nothing has been downloaded yet.

pub mod config;
pub mod format;
pub mod state;

use std::io::Write;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::app::events::FetchEventListener;
use crate::app::lazy_path::ensure_directory_exists;
use crate::app::models::{CacheResult, FetchEvent};
use crate::constants::progress::HEADER_LABEL;
use crate::errors::{ProgressError, ProgressResult};

pub use config::{parse_time_zone, DisplayLocale, ProgressConfig, SummaryVerbosity};
pub use format::{format_bytes, format_elapsed, format_wall_clock};
pub use state::{FinishedArtifact, ListenerPhase, ProgressCounters, ProgressState};

/// Visual weight of a rendered line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    Normal,
    /// Took at least the slow threshold
    Slow,
    /// Took at least the very slow threshold
    VerySlow,
    /// Reports a failure
    Failure,
}

/// One rendered line with its emphasis class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    pub text: String,
    pub emphasis: Emphasis,
}

impl RenderedLine {
    fn new(text: String, emphasis: Emphasis) -> Self {
        Self { text, emphasis }
    }

    fn plain(text: String) -> Self {
        Self::new(text, Emphasis::Normal)
    }

    /// Text with terminal colouring for its emphasis
    pub fn styled(&self) -> String {
        let styled = console::style(&self.text);
        match self.emphasis {
            Emphasis::Normal => styled.to_string(),
            Emphasis::Slow => styled.yellow().to_string(),
            Emphasis::VerySlow => styled.red().to_string(),
            Emphasis::Failure => styled.red().bold().to_string(),
        }
    }
}

/// Event listener that renders fetch progress on demand
#[derive(Debug)]
pub struct LiveProgressListener {
    config: ProgressConfig,
    state: Mutex<ProgressState>,
}

impl LiveProgressListener {
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ProgressState::new()),
        }
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// Whether any event has been received
    pub fn phase(&self) -> ListenerPhase {
        self.lock().phase()
    }

    /// Copy of the current counters
    pub fn snapshot(&self) -> ProgressCounters {
        self.lock().counters()
    }

    /// Render the current state as plain text lines
    pub fn render(&self, at_millis: u64) -> Vec<String> {
        self.render_lines(at_millis)
            .into_iter()
            .map(|line| line.text)
            .collect()
    }

    /// Render the current state with emphasis classes
    ///
    /// `at_millis` is the epoch-millisecond instant the snapshot is taken
    /// at. It only affects elapsed times of work still in flight.
    pub fn render_lines(&self, at_millis: u64) -> Vec<RenderedLine> {
        let state = self.lock();
        let counters = state.counters();
        let locale = &self.config.locale;
        let mut lines = Vec::new();

        if let (Some(first), Some(last)) = (state.first_event_millis(), state.last_event_millis()) {
            let (marker, status, elapsed) = if state.has_outstanding() {
                ("[+]", "", at_millis.saturating_sub(first))
            } else {
                ("[-]", "FINISHED", last.saturating_sub(first))
            };
            lines.push(RenderedLine::plain(format!(
                "{} {}{} {} (started {})",
                marker,
                HEADER_LABEL,
                status,
                format_elapsed(elapsed, locale),
                format_wall_clock(first, &self.config.time_zone)
            )));
        }

        if !(self.config.hide_empty_download && counters.hit == 0) {
            lines.push(RenderedLine::plain(format!(
                "Downloaded: {}/{} artifacts, {}",
                counters.hit,
                counters.total(),
                format_bytes(counters.bytes_downloaded, locale)
            )));
        }

        if self.config.verbosity.include_failures && counters.failed() > 0 {
            lines.push(RenderedLine::new(
                format!(
                    "Failed: {} missed, {} errored",
                    counters.miss, counters.error
                ),
                Emphasis::Failure,
            ));
        }

        if self.config.verbosity.include_details && !self.config.quiet {
            for (key, started) in state.in_flight() {
                let elapsed = at_millis.saturating_sub(started);
                lines.push(RenderedLine::new(
                    format!(" - {} ... {}", key, format_elapsed(elapsed, locale)),
                    self.emphasis_for(elapsed),
                ));
            }

            for artifact in state.finished() {
                lines.push(self.render_finished(artifact));
            }
        }

        lines
    }

    /// Append the rendered snapshot to the configured log file
    ///
    /// Does nothing when no log path is configured.
    pub fn persist_snapshot(&self, at_millis: u64) -> ProgressResult<()> {
        let Some(path) = &self.config.log_path else {
            return Ok(());
        };

        let log_error = |e: std::io::Error| ProgressError::LogWrite {
            path: path.clone(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directory_exists(parent).map_err(log_error)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(log_error)?;

        for line in self.render(at_millis) {
            writeln!(file, "{}", line).map_err(log_error)?;
        }

        debug!("Progress snapshot written to {}", path.display());
        Ok(())
    }

    fn render_finished(&self, artifact: &FinishedArtifact) -> RenderedLine {
        let locale = &self.config.locale;
        let duration = format_elapsed(artifact.duration_ms, locale);

        match &artifact.result {
            CacheResult::Hit { source, .. } => {
                let size = artifact
                    .size
                    .map(|s| format!(" {}", format_bytes(s, locale)))
                    .unwrap_or_default();
                RenderedLine::new(
                    format!(" - {} HIT via {} {}{}", artifact.key, source, duration, size),
                    self.emphasis_for(artifact.duration_ms),
                )
            }
            CacheResult::Miss => RenderedLine::new(
                format!(" - {} MISS {}", artifact.key, duration),
                self.emphasis_for(artifact.duration_ms),
            ),
            CacheResult::Error { reason } => RenderedLine::new(
                format!(" - {} ERROR {}", artifact.key, reason),
                Emphasis::Failure,
            ),
        }
    }

    fn emphasis_for(&self, elapsed_millis: u64) -> Emphasis {
        let elapsed = Duration::from_millis(elapsed_millis);
        if elapsed >= self.config.very_slow_fetch_threshold {
            Emphasis::VerySlow
        } else if elapsed >= self.config.slow_fetch_threshold {
            Emphasis::Slow
        } else {
            Emphasis::Normal
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for LiveProgressListener {
    fn default() -> Self {
        Self::new(ProgressConfig::default())
    }
}

impl FetchEventListener for LiveProgressListener {
    fn on_event(&self, event: &FetchEvent) {
        self.lock().apply(event);
    }
}
