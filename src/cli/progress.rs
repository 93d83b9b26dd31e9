//! Live progress display for fetch runs
//!
//! [`ProgressDisplay`] drives a [`LiveProgressListener`] from a background
//! task. On a terminal the rendered lines are shown in an indicatif spinner
//! that is redrawn every refresh interval. Elsewhere the lines are printed to
//! stderr every few seconds, and only when they changed.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::app::{Clock, ListenerPhase, LiveProgressListener};
use crate::errors::{ProgressError, ProgressResult};

/// How often text mode reports when stderr is not a terminal
const TEXT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Renders a listener while a fetch is running
pub struct ProgressDisplay {
    listener: Arc<LiveProgressListener>,
    clock: Arc<dyn Clock>,
    enabled: bool,
    is_terminal: bool,
    bar: Option<ProgressBar>,
    update_task: Option<JoinHandle<()>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl ProgressDisplay {
    /// Create a display for `listener`; nothing is drawn until [`start`]
    ///
    /// [`start`]: ProgressDisplay::start
    pub fn new(listener: Arc<LiveProgressListener>, clock: Arc<dyn Clock>, enabled: bool) -> Self {
        Self {
            listener,
            clock,
            enabled,
            is_terminal: atty::is(atty::Stream::Stderr),
            bar: None,
            update_task: None,
            shutdown_tx: None,
        }
    }

    /// Start the background refresh task
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::TemplateError` if the spinner style is rejected
    pub fn start(&mut self) -> ProgressResult<()> {
        if !self.enabled || self.update_task.is_some() {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = if self.is_terminal {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .map_err(|e| ProgressError::TemplateError {
                        reason: e.to_string(),
                    })?,
            );
            self.bar = Some(bar.clone());
            self.spawn_terminal_task(bar, shutdown_rx)
        } else {
            self.spawn_text_task(shutdown_rx)
        };

        self.shutdown_tx = Some(shutdown_tx);
        self.update_task = Some(task);
        debug!("Progress display started (terminal: {})", self.is_terminal);
        Ok(())
    }

    fn spawn_terminal_task(
        &self,
        bar: ProgressBar,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let listener = Arc::clone(&self.listener);
        let clock = Arc::clone(&self.clock);
        let mut ticker = tokio::time::interval(listener.config().refresh_interval);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if listener.phase() == ListenerPhase::Idle {
                            continue;
                        }
                        let lines: Vec<String> = listener
                            .render_lines(clock.now_millis())
                            .iter()
                            .map(|line| line.styled())
                            .collect();
                        bar.set_message(lines.join("\n"));
                        bar.tick();
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }

    fn spawn_text_task(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let listener = Arc::clone(&self.listener);
        let clock = Arc::clone(&self.clock);
        let mut ticker = tokio::time::interval(TEXT_REPORT_INTERVAL);

        tokio::spawn(async move {
            let mut last_report: Vec<String> = Vec::new();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if listener.phase() == ListenerPhase::Idle {
                            continue;
                        }
                        let lines = listener.render(clock.now_millis());
                        // The elapsed header changes every tick; compare the rest
                        if lines.get(1..) != last_report.get(1..) {
                            for line in &lines {
                                eprintln!("{}", line);
                            }
                            last_report = lines;
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }

    /// Stop refreshing and print the final snapshot to stderr
    ///
    /// Nothing is printed if no fetch event was ever received.
    /// The snapshot is also appended to the configured progress log.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::LogWrite` if the progress log cannot be written
    pub async fn finish(&mut self) -> ProgressResult<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.update_task.take() {
            if let Err(e) = task.await {
                warn!("Progress task ended abnormally: {}", e);
            }
        }
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }

        let at = self.clock.now_millis();
        if self.enabled && self.listener.phase() == ListenerPhase::Active {
            let lines = self.listener.render_lines(at);
            for line in &lines {
                if self.is_terminal {
                    eprintln!("{}", line.styled());
                } else {
                    eprintln!("{}", line.text);
                }
            }
        }

        self.listener.persist_snapshot(at)
    }

    /// Whether the refresh task is running
    pub fn is_running(&self) -> bool {
        self.update_task.is_some()
    }
}

impl Drop for ProgressDisplay {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
