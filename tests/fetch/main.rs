//! Integration tests for fetch runs
//!
//! These tests drive the orchestrator against real directory and HTTP
//! caches, and run the binary end to end for the command-line surface.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use artifact_fetcher::app::{
    ArtifactCache, ArtifactCacheFactory, CacheBackendFactory, CacheConfig, CacheMode, CacheResult,
    EventBus, ExitStatus, FetchConfig, FetchOrchestrator, LazyPath, LiveProgressListener,
    ProgressConfig, RuleKey, SummaryVerbosity,
};
use artifact_fetcher::errors::{ArtifactCacheResult, CacheError};

const KEY: &str = "b64009ae3762a42a1651c139ec452f0d18f48e21";
const OTHER_KEY: &str = "0123456789abcdef0123456789abcdef01234567";

/// Store `content` in a directory cache under `key`
fn seed_dir_cache(root: &Path, key: &str, content: &[u8]) {
    let dir = root.join(&key[0..2]).join(&key[2..4]);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(key), content).unwrap();
}

fn orchestrator_for(cache: CacheConfig, output: PathBuf, bus: Arc<EventBus>) -> FetchOrchestrator {
    FetchOrchestrator::new(
        FetchConfig::default().with_output_dir(output),
        Arc::new(CacheBackendFactory::new(cache)),
        bus,
    )
}

fn status_text(buffer: Vec<u8>) -> String {
    String::from_utf8(buffer).unwrap()
}

/// Serve `routes` over plain HTTP/1.1, one response per connection
async fn spawn_cache_server(routes: HashMap<String, (u16, Vec<u8>)>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut buffer = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buffer.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                    }
                }

                let request = String::from_utf8_lossy(&buffer);
                let path = request
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();
                let (status, body) = routes.get(&path).cloned().unwrap_or((404, Vec::new()));

                let header = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    if status == 200 { "OK" } else { "Not Found" },
                    body.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Cache that answers from a fixed table and counts closes
struct TableCache {
    answers: HashMap<String, CacheResult>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl ArtifactCache for TableCache {
    async fn fetch(
        &self,
        key: &RuleKey,
        destination: &LazyPath,
    ) -> ArtifactCacheResult<CacheResult> {
        match self.answers.get(&key.to_hex()) {
            Some(CacheResult::Hit { source, mode }) => {
                tokio::fs::write(destination.get()?, b"payload").await?;
                Ok(CacheResult::hit(source.clone(), *mode))
            }
            Some(other) => Ok(other.clone()),
            None => Err(CacheError::ServerError { status: 500 }),
        }
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn mode(&self) -> CacheMode {
        CacheMode::Http
    }
}

struct TableFactory {
    answers: HashMap<String, CacheResult>,
    closes: Arc<AtomicUsize>,
}

impl ArtifactCacheFactory for TableFactory {
    fn open(&self) -> ArtifactCacheResult<Arc<dyn ArtifactCache>> {
        Ok(Arc::new(TableCache {
            answers: self.answers.clone(),
            closes: Arc::clone(&self.closes),
        }))
    }
}

#[tokio::test]
async fn test_no_keys_reports_once() {
    let closes = Arc::new(AtomicUsize::new(0));
    let factory = Arc::new(TableFactory {
        answers: HashMap::new(),
        closes: Arc::clone(&closes),
    });
    let orchestrator =
        FetchOrchestrator::new(FetchConfig::default(), factory, Arc::new(EventBus::new()));

    let mut status = Vec::new();
    let exit = orchestrator.run(&[], &mut status).await;

    assert_eq!(exit, ExitStatus::Failure);
    assert_eq!(exit.code(), 1);
    assert_eq!(status_text(status), "No cache keys specified.\n");
    assert_eq!(closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_http_hit_reports_destination() {
    let mut routes = HashMap::new();
    routes.insert(format!("/artifacts/key/{}", KEY), (200, b"artifact body".to_vec()));
    let addr = spawn_cache_server(routes).await;

    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("out");
    let orchestrator = orchestrator_for(
        CacheConfig::http(format!("http://{}", addr)),
        output.clone(),
        Arc::new(EventBus::new()),
    );

    let mut status = Vec::new();
    let summary = orchestrator
        .run_session(&[KEY.to_string()], &mut status)
        .await
        .unwrap();

    assert_eq!(summary.exit_status(), ExitStatus::Success);
    let text = status_text(status);
    assert!(text.starts_with(&format!("Successfully downloaded artifact with id {} at ", KEY)));
    assert_eq!(
        summary.outcomes[0].result,
        CacheResult::hit("http", CacheMode::Http)
    );

    let destination = summary.outcomes[0].destination.clone().unwrap();
    assert!(destination.starts_with(&output));
    assert_eq!(std::fs::read(destination).unwrap(), b"artifact body");
}

#[tokio::test]
async fn test_http_miss_fails_run() {
    let addr = spawn_cache_server(HashMap::new()).await;
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("out");
    let orchestrator = orchestrator_for(
        CacheConfig::http(format!("http://{}", addr)),
        output.clone(),
        Arc::new(EventBus::new()),
    );

    let mut status = Vec::new();
    let exit = orchestrator.run(&[KEY.to_string()], &mut status).await;

    assert_eq!(exit, ExitStatus::Failure);
    assert_eq!(
        status_text(status),
        format!("Failed to retrieve an artifact with id {}.\n", KEY)
    );
    // Nothing was written, so the output directory was never created
    assert!(!output.exists());
}

#[tokio::test]
async fn test_listener_renders_downloaded_after_hit() {
    let cache_dir = TempDir::new().unwrap();
    seed_dir_cache(cache_dir.path(), KEY, b"0123456789");
    let out_dir = TempDir::new().unwrap();

    let bus = Arc::new(EventBus::new());
    let listener = Arc::new(LiveProgressListener::new(
        ProgressConfig::default().with_verbosity(SummaryVerbosity::detailed()),
    ));
    bus.register(listener.clone());

    let before = listener.render(0);
    assert!(before.iter().any(|line| line.starts_with("Downloaded: 0/0")));

    let orchestrator = orchestrator_for(
        CacheConfig::dir(cache_dir.path()),
        out_dir.path().to_path_buf(),
        bus,
    );
    let mut status = Vec::new();
    let exit = orchestrator.run(&[KEY.to_string()], &mut status).await;
    assert_eq!(exit, ExitStatus::Success);

    let now = chrono::Utc::now().timestamp_millis() as u64;
    let lines = listener.render(now);
    assert!(lines.iter().any(|line| line.contains("Downloaded")));
    assert!(lines.iter().any(|line| line.starts_with("Downloaded: 1/1 artifacts")));
    assert!(lines.iter().any(|line| line.contains("FINISHED")));
    assert!(lines.iter().any(|line| line.contains("HIT via dir")));

    // Rendering again later gives the same stable counts
    assert_eq!(listener.render(now + 60_000)[1..], lines[1..]);
}

#[tokio::test]
async fn test_mixed_outcomes_close_cache_once() {
    let mut answers = HashMap::new();
    answers.insert(KEY.to_string(), CacheResult::hit("http", CacheMode::Http));
    answers.insert(OTHER_KEY.to_string(), CacheResult::miss());
    let closes = Arc::new(AtomicUsize::new(0));
    let factory = Arc::new(TableFactory {
        answers,
        closes: Arc::clone(&closes),
    });

    let out_dir = TempDir::new().unwrap();
    let orchestrator = FetchOrchestrator::new(
        FetchConfig::default().with_output_dir(out_dir.path()),
        factory,
        Arc::new(EventBus::new()),
    );

    let keys = vec![
        KEY.to_string(),
        OTHER_KEY.to_string(),
        "ffffffffffffffffffffffffffffffffffffffff".to_string(),
        "not-a-key".to_string(),
    ];
    let mut status = Vec::new();
    let summary = orchestrator.run_session(&keys, &mut status).await.unwrap();

    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(summary.total(), 4);
    assert_eq!(summary.hit_count(), 1);
    assert_eq!(summary.miss_count(), 1);
    assert_eq!(summary.error_count(), 2);
    assert_eq!(summary.exit_status(), ExitStatus::Failure);

    let text = status_text(status);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("Successfully downloaded artifact with id"));
    assert_eq!(
        lines[1],
        format!("Failed to retrieve an artifact with id {}.", OTHER_KEY)
    );
    assert!(lines[2].contains("ffffffffffffffffffffffffffffffffffffffff"));
    assert!(lines[3].contains("not-a-key"));
}

#[tokio::test]
async fn test_dir_cache_copies_many_artifacts() {
    let cache_dir = TempDir::new().unwrap();
    let keys: Vec<String> = (0..20u8)
        .map(|i| RuleKey::from_bytes([i; 20]).to_hex())
        .collect();
    for (i, key) in keys.iter().enumerate() {
        seed_dir_cache(cache_dir.path(), key, &vec![b'x'; i + 1]);
    }

    let out_dir = TempDir::new().unwrap();
    let orchestrator = FetchOrchestrator::new(
        FetchConfig::default()
            .with_output_dir(out_dir.path())
            .with_max_concurrent_fetches(3),
        Arc::new(CacheBackendFactory::new(CacheConfig::dir(cache_dir.path()))),
        Arc::new(EventBus::new()),
    );

    let mut status = Vec::new();
    let summary = orchestrator.run_session(&keys, &mut status).await.unwrap();

    assert_eq!(summary.hit_count(), 20);
    assert_eq!(summary.downloaded_bytes(), (1..=20).sum::<u64>());
    let text = status_text(status);
    for (line, key) in text.lines().zip(&keys) {
        assert!(line.contains(key.as_str()), "line out of order: {}", line);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dir_cache_repeated_key_succeeds() {
    let cache_dir = TempDir::new().unwrap();
    let content = vec![b'a'; 4 << 20];
    seed_dir_cache(cache_dir.path(), KEY, &content);

    for _ in 0..10 {
        let out_dir = TempDir::new().unwrap();
        let orchestrator = orchestrator_for(
            CacheConfig::dir(cache_dir.path()),
            out_dir.path().to_path_buf(),
            Arc::new(EventBus::new()),
        );
        let keys = vec![KEY.to_string(), KEY.to_string(), KEY.to_string()];

        let mut status = Vec::new();
        let exit = orchestrator.run(&keys, &mut status).await;

        let text = status_text(status);
        assert_eq!(exit, ExitStatus::Success, "status was: {}", text);
        assert_eq!(text.lines().count(), 3);
        assert!(text
            .lines()
            .all(|line| line.starts_with("Successfully downloaded artifact")));

        assert_eq!(std::fs::read(out_dir.path().join(KEY)).unwrap(), content);
        let leftovers: Vec<_> = std::fs::read_dir(out_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name != KEY)
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);
    }
}

#[test]
fn test_cache_open_failure_is_reported() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let temp_dir = TempDir::new().unwrap();
    let orchestrator = orchestrator_for(
        CacheConfig::dir(temp_dir.path().join("missing")),
        temp_dir.path().join("out"),
        Arc::new(EventBus::new()),
    );

    let mut status = Vec::new();
    let result = runtime.block_on(orchestrator.run_session(&[KEY.to_string()], &mut status));
    let error = tokio_test::assert_err!(result);
    assert!(error.to_string().contains("Cache directory not accessible"));
}

/// Run the binary with an isolated working directory and config home
fn run_cli(args: &[&str], work_dir: &Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_artifact_fetcher"))
        .args(args)
        .current_dir(work_dir)
        .env("XDG_CONFIG_HOME", work_dir.join("config"))
        .env("HOME", work_dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_cli_without_keys() {
    let work_dir = TempDir::new().unwrap();
    let output = run_cli(&["fetch", "--no-progress"], work_dir.path());

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        String::from_utf8_lossy(&output.stderr).trim(),
        "No cache keys specified."
    );
}

#[test]
fn test_cli_hit_and_miss() {
    let work_dir = TempDir::new().unwrap();
    let cache_root = work_dir.path().join("cache");
    seed_dir_cache(&cache_root, KEY, b"content");
    let cache_arg = cache_root.to_string_lossy().to_string();

    let hit = run_cli(
        &["fetch", "--no-progress", "--dir-cache", &cache_arg, KEY],
        work_dir.path(),
    );
    assert_eq!(hit.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&hit.stderr);
    assert!(stderr.starts_with(&format!("Successfully downloaded artifact with id {} at ", KEY)));

    let miss = run_cli(
        &["fetch", "--no-progress", "--dir-cache", &cache_arg, OTHER_KEY],
        work_dir.path(),
    );
    assert_eq!(miss.status.code(), Some(1));
    assert_eq!(
        String::from_utf8_lossy(&miss.stderr).trim(),
        format!("Failed to retrieve an artifact with id {}.", OTHER_KEY)
    );
}
