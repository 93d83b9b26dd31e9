//! Command handlers for Artifact Fetcher CLI
//!
//! This module implements the command handlers that merge CLI flags with
//! the loaded configuration and drive the core application functionality.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::app::{
    CacheBackend, CacheBackendFactory, CacheConfig, Clock, EventBus, ExitStatus, FetchConfig,
    FetchOrchestrator, LiveProgressListener, ProgressConfig, SystemClock,
};
use crate::cli::{ConfigAction, ConfigArgs, FetchArgs, ProgressDisplay};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Effective settings for one fetch run
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub progress: ProgressConfig,
    /// Whether the live display is drawn
    pub show_progress: bool,
}

/// Merge fetch flags over the loaded configuration
///
/// # Errors
///
/// Returns an error if the flags are inconsistent or the configuration
/// holds values that cannot be converted.
pub fn resolve_fetch_settings(
    args: &FetchArgs,
    config: &AppConfig,
    quiet: bool,
) -> Result<FetchSettings> {
    args.validate().map_err(AppError::generic)?;

    let mut cache = config.cache.to_runtime_config()?;
    if let Some(root) = &args.dir_cache {
        cache.backend = Some(CacheBackend::Dir { root: root.clone() });
    } else if let Some(url) = &args.http_cache {
        cache.backend = Some(CacheBackend::Http {
            base_url: url.clone(),
        });
    }

    let mut fetch = config.fetch.to_runtime_config();
    if let Some(concurrency) = args.concurrency {
        fetch.max_concurrent_fetches = concurrency;
    }
    if let Some(timeout) = args.timeout {
        fetch.fetch_timeout = Some(timeout);
    }
    if let Some(dir) = &args.output_dir {
        fetch.output_dir = Some(dir.clone());
    }

    let mut progress = config.progress.to_runtime_config()?;
    if args.details {
        progress.verbosity.include_details = true;
    }
    if quiet {
        progress.quiet = true;
    }
    progress.validate().map_err(AppError::generic)?;

    Ok(FetchSettings {
        cache,
        fetch,
        progress,
        show_progress: config.progress.enabled && !args.no_progress && !quiet,
    })
}

/// Handle the fetch command
///
/// Status lines are written to stderr in the order the keys were given,
/// after the live display has printed its final snapshot. With `--json` a
/// summary is also printed to stdout.
pub async fn handle_fetch(args: FetchArgs, config: &AppConfig, quiet: bool) -> Result<ExitStatus> {
    let start_time = Instant::now();
    let settings = resolve_fetch_settings(&args, config, quiet)?;
    info!(
        "Starting fetch of {} keys with {} concurrent fetches",
        args.keys.len(),
        settings.fetch.max_concurrent_fetches
    );

    let factory = Arc::new(CacheBackendFactory::new(settings.cache));
    let event_bus = Arc::new(EventBus::new());
    let listener = Arc::new(LiveProgressListener::new(settings.progress));
    event_bus.register(listener.clone());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let orchestrator =
        FetchOrchestrator::new(settings.fetch, factory, event_bus).with_clock(Arc::clone(&clock));
    let signal_task = orchestrator.install_signal_handler();

    let mut display = ProgressDisplay::new(listener, clock, settings.show_progress);
    display.start()?;

    // Status lines are held back until the live display has been cleared
    let mut status: Vec<u8> = Vec::new();
    let mut summary_json = None;
    let exit_status = if args.json {
        match orchestrator.run_session(&args.keys, &mut status).await {
            Ok(summary) => {
                summary_json = Some(
                    serde_json::to_string_pretty(&summary).map_err(|e| {
                        AppError::generic(format!("Failed to encode summary: {}", e))
                    })?,
                );
                summary.exit_status()
            }
            Err(e) => {
                writeln!(status, "{}", e)?;
                ExitStatus::Failure
            }
        }
    } else {
        orchestrator.run(&args.keys, &mut status).await
    };

    signal_task.abort();
    if let Err(e) = display.finish().await {
        warn!("Failed to finish progress display: {}", e);
    }

    let mut stderr = io::stderr();
    stderr.write_all(&status)?;
    stderr.flush()?;
    if let Some(json) = summary_json {
        let mut stdout = io::stdout();
        writeln!(stdout, "{}", json)?;
        stdout.flush()?;
    }

    if let Some(dir) = orchestrator.output_directory() {
        debug!("Artifacts written under {}", dir.display());
    }
    info!(
        "Fetch command finished in {:?} with exit code {}",
        start_time.elapsed(),
        exit_status.code()
    );
    Ok(exit_status)
}

/// Handle the config command
pub async fn handle_config(
    args: ConfigArgs,
    config: &AppConfig,
    config_path: Option<PathBuf>,
) -> Result<()> {
    match args.action {
        ConfigAction::Init { path, force } => {
            let target = path.or(config_path);
            let (path, written) = AppConfig::initialize(target, force).await?;
            if written {
                println!("Wrote default configuration to {}", path.display());
            } else {
                println!(
                    "Configuration already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
        }
        ConfigAction::Show => {
            match AppConfig::find_config_file() {
                Some(path) => debug!("Effective configuration includes {}", path.display()),
                None => debug!("Showing built-in defaults"),
            }
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}
