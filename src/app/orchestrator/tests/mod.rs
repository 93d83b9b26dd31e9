//! Unit tests for the fetch orchestrator
//!
//! These tests drive the orchestrator against a scripted in-memory cache so
//! that hits, misses, errors, slow fetches and hangs can be arranged per key.
//! End-to-end tests with the real backends live in the top-level tests
//! directory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use super::*;
use crate::app::cache::ArtifactCache;
use crate::app::clock::ManualClock;
use crate::app::events::FetchEventListener;
use crate::app::lazy_path::LazyPath;
use crate::app::models::{CacheMode, CacheResultKind, FetchEventKind};
use crate::errors::{ArtifactCacheResult, CacheError};

pub const KEY_A: &str = "b64009ae3762a42a1651c139ec452f0d18f48e21";
pub const KEY_B: &str = "0123456789abcdef0123456789abcdef01234567";
pub const KEY_C: &str = "ffffffffffffffffffffffffffffffffffffffff";

/// Scripted response for one key
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Write the bytes to the destination and report a hit
    Hit(Vec<u8>),
    /// Report a hit without writing anything
    HitWithoutWrite,
    Miss,
    /// Fail with an I/O error carrying this message
    Fail(String),
    /// Never settle on its own
    Hang,
}

/// In-memory cache that answers from a script and counts its calls
pub struct ScriptedCache {
    responses: HashMap<String, Scripted>,
    delay: Duration,
    pub closes: AtomicUsize,
    pub fetches: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedCache {
    pub fn new(responses: &[(&str, Scripted)]) -> Self {
        Self {
            responses: responses
                .iter()
                .map(|(k, r)| (k.to_string(), r.clone()))
                .collect(),
            delay: Duration::ZERO,
            closes: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactCache for ScriptedCache {
    async fn fetch(
        &self,
        key: &RuleKey,
        destination: &LazyPath,
    ) -> ArtifactCacheResult<CacheResult> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = self
            .responses
            .get(&key.to_hex())
            .cloned()
            .unwrap_or(Scripted::Miss);

        let result = match response {
            Scripted::Hit(content) => {
                let path = destination.get()?;
                tokio::fs::write(&path, content).await?;
                Ok(CacheResult::hit("http", CacheMode::Http))
            }
            Scripted::HitWithoutWrite => Ok(CacheResult::hit("http", CacheMode::Http)),
            Scripted::Miss => Ok(CacheResult::miss()),
            Scripted::Fail(message) => Err(CacheError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                message,
            ))),
            Scripted::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(CacheResult::miss())
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn mode(&self) -> CacheMode {
        CacheMode::Http
    }
}

/// Factory handing out one shared scripted cache
pub struct ScriptedFactory {
    cache: Arc<ScriptedCache>,
    pub opens: AtomicUsize,
    fail: bool,
    /// Triggered while the cache is being opened
    shutdown_on_open: Mutex<Option<ShutdownHandle>>,
}

impl ScriptedFactory {
    pub fn new(cache: Arc<ScriptedCache>) -> Self {
        Self {
            cache,
            opens: AtomicUsize::new(0),
            fail: false,
            shutdown_on_open: Mutex::new(None),
        }
    }

    pub fn failing(cache: Arc<ScriptedCache>) -> Self {
        Self {
            fail: true,
            ..Self::new(cache)
        }
    }

    pub fn shutdown_on_open(&self, handle: ShutdownHandle) {
        *self.shutdown_on_open.lock().unwrap() = Some(handle);
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl ArtifactCacheFactory for ScriptedFactory {
    fn open(&self) -> ArtifactCacheResult<Arc<dyn ArtifactCache>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.shutdown_on_open.lock().unwrap().as_ref() {
            handle.trigger();
        }
        if self.fail {
            return Err(CacheError::DirectoryNotAccessible {
                path: PathBuf::from("/unreachable"),
            });
        }
        Ok(self.cache.clone())
    }
}

/// Listener that records every event it sees
#[derive(Default)]
pub struct RecordingListener {
    pub events: Mutex<Vec<FetchEvent>>,
}

impl FetchEventListener for RecordingListener {
    fn on_event(&self, event: &FetchEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

impl RecordingListener {
    fn count(&self, started: bool) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e.kind, FetchEventKind::Started { .. }) == started)
            .count()
    }
}

struct Harness {
    orchestrator: FetchOrchestrator,
    cache: Arc<ScriptedCache>,
    factory: Arc<ScriptedFactory>,
    listener: Arc<RecordingListener>,
    output: TempDir,
}

fn harness(cache: ScriptedCache, config: FetchConfig) -> Harness {
    let output = TempDir::new().unwrap();
    let cache = Arc::new(cache);
    let factory = Arc::new(ScriptedFactory::new(cache.clone()));
    harness_with_factory(cache, factory, config, output)
}

fn harness_with_factory(
    cache: Arc<ScriptedCache>,
    factory: Arc<ScriptedFactory>,
    config: FetchConfig,
    output: TempDir,
) -> Harness {
    let bus = Arc::new(EventBus::new());
    let listener = Arc::new(RecordingListener::default());
    bus.register(listener.clone());

    let orchestrator = FetchOrchestrator::new(
        config.with_output_dir(output.path().join("artifacts")),
        factory.clone(),
        bus,
    );

    Harness {
        orchestrator,
        cache,
        factory,
        listener,
        output,
    }
}

fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

fn status_lines(buffer: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(buffer)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Test that an empty key list never touches the cache
#[tokio::test]
async fn test_empty_keys_report_and_skip_cache() {
    let h = harness(ScriptedCache::new(&[]), FetchConfig::default());
    let mut status = Vec::new();

    let exit = h.orchestrator.run(&[], &mut status).await;

    assert_eq!(exit, ExitStatus::Failure);
    assert_eq!(String::from_utf8(status).unwrap(), "No cache keys specified.\n");
    assert_eq!(h.factory.open_count(), 0);
    assert_eq!(h.cache.close_count(), 0);
    assert!(h.listener.events.lock().unwrap().is_empty());
}

/// Test that a single hit succeeds and reports where the artifact landed
#[tokio::test]
async fn test_single_hit_succeeds() {
    let h = harness(
        ScriptedCache::new(&[(KEY_A, Scripted::Hit(b"payload".to_vec()))]),
        FetchConfig::default(),
    );
    let mut status = Vec::new();

    let summary = h
        .orchestrator
        .run_session(&keys(&[KEY_A]), &mut status)
        .await
        .unwrap();

    assert_eq!(summary.exit_status(), ExitStatus::Success);
    assert_eq!(h.cache.close_count(), 1);

    let lines = status_lines(&status);
    assert_eq!(lines.len(), 1);
    let prefix = format!("Successfully downloaded artifact with id {} at ", KEY_A);
    assert!(lines[0].starts_with(&prefix), "unexpected line: {}", lines[0]);

    let expected_path = h.output.path().join("artifacts").join(KEY_A);
    assert_eq!(summary.outcomes[0].destination, Some(expected_path.clone()));
    assert_eq!(summary.outcomes[0].artifact_size, Some(7));
    assert_eq!(std::fs::read(expected_path).unwrap(), b"payload");
}

/// Test that a hit which never wrote a file still reports a destination
#[tokio::test]
async fn test_hit_without_write_realizes_destination() {
    let h = harness(
        ScriptedCache::new(&[(KEY_A, Scripted::HitWithoutWrite)]),
        FetchConfig::default(),
    );
    let mut status = Vec::new();

    let exit = h.orchestrator.run(&keys(&[KEY_A]), &mut status).await;

    assert_eq!(exit, ExitStatus::Success);
    assert!(status_lines(&status)[0].contains(" at "));
    assert!(h.orchestrator.output_directory().is_some());
}

/// Test that a miss fails with the plain failure line and leaves no output
#[tokio::test]
async fn test_single_miss_fails() {
    let h = harness(
        ScriptedCache::new(&[(KEY_A, Scripted::Miss)]),
        FetchConfig::default(),
    );
    let mut status = Vec::new();

    let exit = h.orchestrator.run(&keys(&[KEY_A]), &mut status).await;

    assert_eq!(exit, ExitStatus::Failure);
    assert_eq!(
        status_lines(&status),
        vec![format!("Failed to retrieve an artifact with id {}.", KEY_A)]
    );
    assert_eq!(h.cache.close_count(), 1);
    assert!(!h.output.path().join("artifacts").exists());
}

/// Test that client errors become per-key error outcomes with a reason
#[tokio::test]
async fn test_cache_error_reported_with_reason() {
    let h = harness(
        ScriptedCache::new(&[
            (KEY_A, Scripted::Fail("connection reset".to_string())),
            (KEY_B, Scripted::Hit(b"ok".to_vec())),
        ]),
        FetchConfig::default(),
    );
    let mut status = Vec::new();

    let summary = h
        .orchestrator
        .run_session(&keys(&[KEY_A, KEY_B]), &mut status)
        .await
        .unwrap();

    assert_eq!(summary.exit_status(), ExitStatus::Failure);
    assert_eq!(summary.error_count(), 1);
    assert_eq!(summary.hit_count(), 1);

    let lines = status_lines(&status);
    assert!(lines[0].starts_with(&format!(
        "Failed to retrieve an artifact with id {}. Reason: ",
        KEY_A
    )));
    assert!(lines[0].contains("connection reset"));
    assert!(lines[1].starts_with("Successfully downloaded artifact"));
}

/// Test that status lines follow input order, not completion order
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_status_lines_in_input_order() {
    let h = harness(
        ScriptedCache::new(&[
            (KEY_A, Scripted::Miss),
            (KEY_B, Scripted::Hit(b"b".to_vec())),
            (KEY_C, Scripted::Miss),
        ])
        .with_delay(Duration::from_millis(5)),
        FetchConfig::default(),
    );
    let mut status = Vec::new();

    let summary = h
        .orchestrator
        .run_session(&keys(&[KEY_C, "bogus", KEY_B, KEY_A]), &mut status)
        .await
        .unwrap();

    let lines = status_lines(&status);
    assert_eq!(lines.len(), 4);
    assert!(lines[0].contains(KEY_C));
    assert!(lines[1].contains("id bogus. Reason: "));
    assert!(lines[2].contains(KEY_B));
    assert!(lines[3].contains(KEY_A));

    let kinds: Vec<_> = summary.outcomes.iter().map(|o| o.result.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            CacheResultKind::Miss,
            CacheResultKind::Error,
            CacheResultKind::Hit,
            CacheResultKind::Miss
        ]
    );
}

/// Test that malformed keys never open the cache on their own
#[tokio::test]
async fn test_only_malformed_keys_skip_cache() {
    let h = harness(ScriptedCache::new(&[]), FetchConfig::default());
    let mut status = Vec::new();

    let exit = h
        .orchestrator
        .run(&keys(&["xyz", "1234"]), &mut status)
        .await;

    assert_eq!(exit, ExitStatus::Failure);
    assert_eq!(h.factory.open_count(), 0);
    assert_eq!(h.cache.close_count(), 0);
    assert_eq!(status_lines(&status).len(), 2);
    assert_eq!(h.listener.count(false), 2);
    assert_eq!(h.listener.count(true), 0);
}

/// Test that Started and Finished events are published per key with clock time
#[tokio::test]
async fn test_events_published_for_every_key() {
    let clock = Arc::new(ManualClock::new(42_000));
    let mut h = harness(
        ScriptedCache::new(&[(KEY_A, Scripted::Hit(vec![1, 2, 3])), (KEY_B, Scripted::Miss)]),
        FetchConfig::default(),
    );
    h.orchestrator = h.orchestrator.with_clock(clock);
    let mut status = Vec::new();

    h.orchestrator
        .run(&keys(&[KEY_A, KEY_B]), &mut status)
        .await;

    assert_eq!(h.listener.count(true), 2);
    assert_eq!(h.listener.count(false), 2);
    for event in h.listener.events.lock().unwrap().iter() {
        assert_eq!(event.timestamp_millis, 42_000);
    }
}

/// Test that a repeated key is fetched once and reported for every request
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_key_fetched_once() {
    let h = harness(
        ScriptedCache::new(&[(KEY_A, Scripted::Hit(vec![9; 4096])), (KEY_B, Scripted::Miss)])
            .with_delay(Duration::from_millis(10)),
        FetchConfig::default(),
    );
    let mut status = Vec::new();

    let summary = h
        .orchestrator
        .run_session(&keys(&[KEY_A, KEY_B, KEY_A, KEY_A]), &mut status)
        .await
        .unwrap();

    assert_eq!(h.cache.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(h.cache.close_count(), 1);
    assert_eq!(summary.hit_count(), 3);
    assert_eq!(summary.miss_count(), 1);

    let lines = status_lines(&status);
    assert_eq!(lines.len(), 4);
    for index in [0, 2, 3] {
        assert!(lines[index].starts_with(&format!(
            "Successfully downloaded artifact with id {}",
            KEY_A
        )));
    }
    assert!(lines[1].contains(KEY_B));

    let written = h.output.path().join("artifacts").join(KEY_A);
    assert_eq!(std::fs::read(written).unwrap().len(), 4096);

    // One fetch per distinct key, one Started and one Finished each
    assert_eq!(h.listener.count(true), 2);
    assert_eq!(h.listener.count(false), 2);
}

/// Test that a repeated key that succeeds gives a successful exit
#[tokio::test]
async fn test_repeated_cached_key_succeeds() {
    let h = harness(
        ScriptedCache::new(&[(KEY_A, Scripted::Hit(b"artifact".to_vec()))]),
        FetchConfig::default(),
    );
    let mut status = Vec::new();

    let exit = h
        .orchestrator
        .run(&keys(&[KEY_A, KEY_A, KEY_A]), &mut status)
        .await;

    assert_eq!(exit, ExitStatus::Success);
    assert_eq!(status_lines(&status).len(), 3);
}

/// Test that concurrency never exceeds the configured limit
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limit_respected() {
    let responses: Vec<String> = (0..10).map(|i| format!("{:040x}", i + 1)).collect();
    let scripted: Vec<(&str, Scripted)> = responses
        .iter()
        .map(|k| (k.as_str(), Scripted::Miss))
        .collect();
    let h = harness(
        ScriptedCache::new(&scripted).with_delay(Duration::from_millis(20)),
        FetchConfig::default().with_max_concurrent_fetches(2),
    );
    let mut status = Vec::new();

    h.orchestrator.run(&responses, &mut status).await;

    assert_eq!(h.cache.fetches.load(Ordering::SeqCst), 10);
    assert!(h.cache.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(h.cache.close_count(), 1);
}

/// Test that a shutdown request cancels pending fetches and still closes once
#[tokio::test]
async fn test_shutdown_interrupts_pending_fetches() {
    let h = harness(
        ScriptedCache::new(&[
            (KEY_A, Scripted::Hit(b"fast".to_vec())),
            (KEY_B, Scripted::Hang),
            (KEY_C, Scripted::Hang),
        ]),
        FetchConfig::default(),
    );
    let handle = h.orchestrator.shutdown_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.trigger();
    });
    let mut status = Vec::new();

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        h.orchestrator
            .run_session(&keys(&[KEY_A, KEY_B, KEY_C]), &mut status),
    )
    .await
    .expect("run should finish after shutdown")
    .unwrap();

    assert!(summary.was_interrupted());
    assert_eq!(summary.exit_status(), ExitStatus::Failure);
    assert_eq!(h.cache.close_count(), 1);

    let lines = status_lines(&status);
    assert!(lines[0].starts_with("Successfully downloaded artifact"));
    assert_eq!(
        lines[1],
        format!(
            "Failed to retrieve an artifact with id {}. Reason: fetch interrupted",
            KEY_B
        )
    );
    assert!(lines[2].ends_with("Reason: fetch interrupted"));

    // Every key gets exactly one Finished event, including cancelled ones
    assert_eq!(h.listener.count(false), 3);
}

/// Test that a shutdown requested while the cache opens is not lost
#[tokio::test]
async fn test_shutdown_during_open_interrupts_run() {
    let h = harness(
        ScriptedCache::new(&[(KEY_A, Scripted::Hit(b"bytes".to_vec())), (KEY_B, Scripted::Hang)]),
        FetchConfig::default(),
    );
    h.factory.shutdown_on_open(h.orchestrator.shutdown_handle());
    let mut status = Vec::new();

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        h.orchestrator
            .run_session(&keys(&[KEY_A, KEY_B]), &mut status),
    )
    .await
    .expect("run should not wait for the hanging fetch")
    .unwrap();

    assert!(summary.was_interrupted());
    assert_eq!(summary.exit_status(), ExitStatus::Failure);
    assert_eq!(h.factory.open_count(), 1);
    assert_eq!(h.cache.close_count(), 1);
    assert_eq!(h.cache.fetches.load(Ordering::SeqCst), 0);

    let lines = status_lines(&status);
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.ends_with("Reason: fetch interrupted")));
}

/// Test that the run timeout behaves like an interruption
#[tokio::test]
async fn test_fetch_timeout_interrupts_run() {
    let h = harness(
        ScriptedCache::new(&[(KEY_A, Scripted::Hang)]),
        FetchConfig::default().with_fetch_timeout(Duration::from_millis(50)),
    );
    let mut status = Vec::new();

    let summary = h
        .orchestrator
        .run_session(&keys(&[KEY_A]), &mut status)
        .await
        .unwrap();

    assert!(summary
        .interruption
        .as_deref()
        .unwrap()
        .contains("timed out"));
    assert_eq!(summary.exit_status(), ExitStatus::Failure);
    assert_eq!(h.cache.close_count(), 1);
}

/// Test that a cache which cannot be opened fails the run
#[tokio::test]
async fn test_cache_open_failure_fails_run() {
    let cache = Arc::new(ScriptedCache::new(&[]));
    let factory = Arc::new(ScriptedFactory::failing(cache.clone()));
    let h = harness_with_factory(cache, factory, FetchConfig::default(), TempDir::new().unwrap());

    let mut status = Vec::new();
    let result = h
        .orchestrator
        .run_session(&keys(&[KEY_A]), &mut status)
        .await;
    assert!(matches!(result, Err(FetchError::Cache(_))));

    let mut status = Vec::new();
    let exit = h.orchestrator.run(&keys(&[KEY_A]), &mut status).await;
    assert_eq!(exit, ExitStatus::Failure);
    assert!(String::from_utf8(status)
        .unwrap()
        .contains("Cache directory not accessible"));
    assert_eq!(h.cache.close_count(), 0);
}

/// Test that invalid configuration is rejected before any work
#[tokio::test]
async fn test_invalid_config_rejected() {
    let h = harness(
        ScriptedCache::new(&[]),
        FetchConfig::default().with_max_concurrent_fetches(0),
    );
    let mut status = Vec::new();

    let result = h
        .orchestrator
        .run_session(&keys(&[KEY_A]), &mut status)
        .await;

    assert!(matches!(result, Err(FetchError::InvalidConfig { .. })));
    assert_eq!(h.factory.open_count(), 0);
}
