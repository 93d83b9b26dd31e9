//! Fetch orchestration
//!
//! The orchestrator turns a list of requested keys into one outcome per key,
//! a status line per key and a single exit status. It fetches concurrently,
//! fetches a key requested more than once only once, publishes a `Started`
//! and a `Finished` event for every distinct key on the event bus, and
//! guarantees the cache client is closed exactly once, after every
//! fetch has settled or been aborted.
//!
//! # Architecture
//!
//! - [`config`] - Concurrency, timeout and output directory settings
//! - [`signals`] - Ctrl-C/SIGTERM forwarding and programmatic shutdown
//! - [`stats`] - The per-run [`FetchSummary`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use artifact_fetcher::app::cache::{CacheBackendFactory, CacheConfig};
//! use artifact_fetcher::app::{EventBus, FetchConfig, FetchOrchestrator};
//!
//! # async fn example() {
//! let factory = Arc::new(CacheBackendFactory::new(CacheConfig::http("http://cache.local")));
//! let orchestrator = FetchOrchestrator::new(
//!     FetchConfig::default(),
//!     factory,
//!     Arc::new(EventBus::new()),
//! );
//!
//! let keys = vec!["b64009ae3762a42a1651c139ec452f0d18f48e21".to_string()];
//! let status = orchestrator.run(&keys, &mut std::io::stderr()).await;
//! std::process::exit(status.code());
//! # }
//! ```

pub mod config;
pub mod signals;
pub mod stats;

#[cfg(test)]
pub mod tests;

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::app::cache::{ArtifactCache, ArtifactCacheFactory, CacheLease};
use crate::app::clock::{Clock, SystemClock};
use crate::app::events::EventBus;
use crate::app::lazy_path::{OutputDirectory, OutputLocation};
use crate::app::models::{CacheResult, ExitStatus, FetchEvent, FetchOutcome};
use crate::app::rule_key::RuleKey;
use crate::constants::messages;
use crate::errors::{FetchError, FetchResult, KeyResult};

pub use config::FetchConfig;
pub use signals::{create_shutdown_channel, ShutdownHandle, SignalHandler};
pub use stats::FetchSummary;

/// Reason recorded for a key whose task panicked
const TASK_FAILED_REASON: &str = "fetch task failed";

/// Issues concurrent fetches and reports their outcomes
pub struct FetchOrchestrator {
    config: FetchConfig,
    factory: Arc<dyn ArtifactCacheFactory>,
    event_bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    output: Arc<OutputDirectory>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Everything a single fetch task needs
#[derive(Clone)]
struct FetchContext {
    cache: Arc<dyn ArtifactCache>,
    event_bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    output: Arc<OutputDirectory>,
    permits: Arc<Semaphore>,
}

impl FetchOrchestrator {
    /// Create an orchestrator
    ///
    /// The cache is not opened here. `factory` is only called by a run that
    /// has at least one well-formed key.
    pub fn new(
        config: FetchConfig,
        factory: Arc<dyn ArtifactCacheFactory>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let output = match &config.output_dir {
            Some(dir) => OutputDirectory::fixed(dir.clone()),
            None => OutputDirectory::temporary(),
        };
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            config,
            factory,
            event_bus,
            clock: Arc::new(SystemClock),
            output: Arc::new(output),
            shutdown_tx,
        }
    }

    /// Use a different time source for event timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle that interrupts the run in progress
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self.shutdown_tx.clone())
    }

    /// Forward Ctrl-C and SIGTERM to this orchestrator's shutdown channel
    pub fn install_signal_handler(&self) -> tokio::task::JoinHandle<()> {
        SignalHandler::new(self.shutdown_tx.clone()).setup()
    }

    /// Output directory, once something has been written to it
    pub fn output_directory(&self) -> Option<PathBuf> {
        self.output.resolved()
    }

    /// Configured output location
    pub fn output_location(&self) -> &OutputLocation {
        self.output.location()
    }

    /// Fetch every key and return the process exit status
    ///
    /// Status lines go to `status`. Errors that fail the whole run, such as
    /// an empty key list or a cache that cannot be opened, are reported
    /// there too.
    pub async fn run<W>(&self, keys: &[String], status: &mut W) -> ExitStatus
    where
        W: Write + Send + ?Sized,
    {
        match self.run_session(keys, status).await {
            Ok(summary) => summary.exit_status(),
            Err(e) => {
                match &e {
                    FetchError::NoKeysProvided => debug!("No keys requested"),
                    other => error!("Fetch run failed: {}", other),
                }
                if let Err(write_error) = writeln!(status, "{}", e) {
                    warn!("Failed to write status line: {}", write_error);
                }
                ExitStatus::Failure
            }
        }
    }

    /// Fetch every key and return the full summary
    ///
    /// # Errors
    ///
    /// - `FetchError::NoKeysProvided` if `keys` is empty; nothing is
    ///   written and the cache is never opened
    /// - `FetchError::InvalidConfig` if the configuration does not validate
    /// - `FetchError::Cache` if the cache cannot be opened
    /// - `FetchError::StatusOutput` if status lines cannot be written
    pub async fn run_session<W>(&self, keys: &[String], status: &mut W) -> FetchResult<FetchSummary>
    where
        W: Write + Send + ?Sized,
    {
        if keys.is_empty() {
            return Err(FetchError::NoKeysProvided);
        }
        self.config
            .validate()
            .map_err(|reason| FetchError::InvalidConfig { reason })?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let session_start = Instant::now();
        let parsed: Vec<KeyResult<RuleKey>> = keys.iter().map(|k| RuleKey::from_hex(k)).collect();
        let mut slots: Vec<Option<FetchOutcome>> = vec![None; keys.len()];

        // Malformed keys settle immediately without touching the cache
        for (index, (raw, key)) in keys.iter().zip(&parsed).enumerate() {
            if let Err(e) = key {
                warn!("Skipping malformed key '{}': {}", raw, e);
                let outcome = FetchOutcome::invalid_key(raw.clone(), e);
                self.publish(FetchEvent::finished(
                    outcome.clone(),
                    self.clock.now_millis(),
                ));
                slots[index] = Some(outcome);
            }
        }

        let mut interruption = None;
        if parsed.iter().any(Result::is_ok) {
            let lease = CacheLease::new(self.factory.open()?);
            info!(
                "Fetching {} artifacts from {} cache with up to {} concurrent fetches",
                parsed.iter().filter(|k| k.is_ok()).count(),
                lease.cache().mode(),
                self.config.max_concurrent_fetches
            );

            interruption = self
                .fetch_all(&lease, &parsed, &mut slots, &mut shutdown_rx)
                .await;
            lease.release();
        }

        let outcomes = self.settle_pending(keys, &parsed, slots, interruption.is_some());
        let mut summary = FetchSummary::new(outcomes, session_start.elapsed());
        if let Some(reason) = interruption {
            summary = summary.with_interruption(reason);
        }

        for outcome in &summary.outcomes {
            writeln!(status, "{}", outcome.status_line())?;
        }
        status.flush()?;

        info!(
            "Fetch run finished in {:?}: {} hit, {} missed, {} errored",
            summary.total_duration,
            summary.hit_count(),
            summary.miss_count(),
            summary.error_count()
        );
        Ok(summary)
    }

    /// Run every well-formed key to completion or interruption
    ///
    /// Each distinct key is fetched once and its outcome is copied to every
    /// position that requested it. Returns the interruption reason, if any.
    /// When this returns, every spawned task has finished or been cancelled.
    async fn fetch_all(
        &self,
        lease: &CacheLease,
        parsed: &[KeyResult<RuleKey>],
        slots: &mut [Option<FetchOutcome>],
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Option<String> {
        let groups = group_by_key(parsed);

        // A shutdown requested while the cache was opening
        if !matches!(
            shutdown_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ) {
            let reason = FetchError::Interrupted {
                reason: messages::INTERRUPTED_REASON.to_string(),
            };
            warn!("{} before any fetch started", reason);
            return Some(reason.to_string());
        }

        let context = FetchContext {
            cache: lease.cache(),
            event_bus: Arc::clone(&self.event_bus),
            clock: Arc::clone(&self.clock),
            output: Arc::clone(&self.output),
            permits: Arc::new(Semaphore::new(self.config.max_concurrent_fetches)),
        };

        let mut tasks = JoinSet::new();
        for (group, (key, _)) in groups.iter().enumerate() {
            let context = context.clone();
            let key = *key;
            tasks.spawn(async move { (group, fetch_one(context, key).await) });
        }
        drop(context);

        let deadline = async {
            match self.config.fetch_timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut interruption: Option<String> = None;
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((group, outcome))) => {
                        for &index in &groups[group].1 {
                            slots[index] = Some(outcome.clone());
                        }
                    }
                    Some(Err(e)) if e.is_panic() => error!("Fetch task panicked: {}", e),
                    Some(Err(_)) => {}
                    None => break,
                },
                _ = shutdown_rx.recv(), if interruption.is_none() => {
                    let reason = FetchError::Interrupted {
                        reason: messages::INTERRUPTED_REASON.to_string(),
                    };
                    warn!("{}, cancelling {} pending fetches", reason, tasks.len());
                    interruption = Some(reason.to_string());
                    tasks.abort_all();
                }
                _ = &mut deadline, if interruption.is_none() => {
                    let reason = FetchError::Timeout {
                        seconds: self.config.fetch_timeout.map_or(0, |t| t.as_secs()),
                    };
                    warn!("{}, cancelling {} pending fetches", reason, tasks.len());
                    interruption = Some(reason.to_string());
                    tasks.abort_all();
                }
            }
        }

        interruption
    }

    /// Fill in outcomes for keys whose task never reported one
    ///
    /// A repeated key publishes a single `Finished` event, matching the
    /// single fetch it would have had.
    fn settle_pending(
        &self,
        keys: &[String],
        parsed: &[KeyResult<RuleKey>],
        slots: Vec<Option<FetchOutcome>>,
        interrupted: bool,
    ) -> Vec<FetchOutcome> {
        let mut announced: HashSet<RuleKey> = HashSet::new();
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| match slot {
                Some(outcome) => outcome,
                None => {
                    let rule_key = parsed[index].as_ref().ok().copied();
                    let outcome = if interrupted {
                        FetchOutcome::interrupted(keys[index].clone(), rule_key)
                    } else {
                        FetchOutcome {
                            result: CacheResult::error(TASK_FAILED_REASON),
                            ..FetchOutcome::interrupted(keys[index].clone(), rule_key)
                        }
                    };
                    if rule_key.map_or(true, |key| announced.insert(key)) {
                        self.publish(FetchEvent::finished(
                            outcome.clone(),
                            self.clock.now_millis(),
                        ));
                    }
                    outcome
                }
            })
            .collect()
    }

    fn publish(&self, event: FetchEvent) {
        self.event_bus.publish(&event);
    }
}

/// Distinct well-formed keys in first-seen order, with every input index
/// that requested each one
fn group_by_key(parsed: &[KeyResult<RuleKey>]) -> Vec<(RuleKey, Vec<usize>)> {
    let mut groups: Vec<(RuleKey, Vec<usize>)> = Vec::new();
    let mut positions: HashMap<RuleKey, usize> = HashMap::new();
    for (index, key) in parsed.iter().enumerate() {
        if let Ok(key) = key {
            let group = *positions.entry(*key).or_insert_with(|| {
                groups.push((*key, Vec::new()));
                groups.len() - 1
            });
            groups[group].1.push(index);
        }
    }
    groups
}

/// Fetch a single key, publishing its events
async fn fetch_one(context: FetchContext, key: RuleKey) -> FetchOutcome {
    // The semaphore is never closed, so acquire only fails if that changes
    let _permit = Arc::clone(&context.permits).acquire_owned().await.ok();

    let hex = key.to_hex();
    context
        .event_bus
        .publish(&FetchEvent::started(hex.clone(), context.clock.now_millis()));

    let started = Instant::now();
    let destination = context.output.lazy_path_for(hex);

    let result = match context.cache.fetch(&key, &destination).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Fetch of {} failed: {}", key, e);
            CacheResult::error(e.to_string())
        }
    };

    let (result, path) = if result.is_hit() {
        match destination.get() {
            Ok(path) => (result, Some(path)),
            Err(e) => (CacheResult::error(e.to_string()), None),
        }
    } else {
        (result, None)
    };

    let artifact_size = match &path {
        Some(path) => tokio::fs::metadata(path)
            .await
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len()),
        None => None,
    };

    let outcome = FetchOutcome::new(key, result, path)
        .with_artifact_size(artifact_size)
        .with_duration_ms(duration_millis(started.elapsed()));

    debug!("{} settled: {}", key, outcome.result);
    context
        .event_bus
        .publish(&FetchEvent::finished(outcome.clone(), context.clock.now_millis()));
    outcome
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
