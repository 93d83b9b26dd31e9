//! Artifact Fetcher CLI application
//!
//! Command-line interface for downloading build artifacts by rule key from a
//! directory or HTTP cache.

use std::process;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{filter::Directive, fmt, EnvFilter};

use artifact_fetcher::app::ExitStatus;
use artifact_fetcher::cli::{handle_config, handle_fetch, Cli, Commands};
use artifact_fetcher::config::AppConfig;

#[tokio::main]
async fn main() {
    let status = match run().await {
        Ok(status) => status,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitStatus::Failure
        }
    };

    process::exit(status.code());
}

/// Main application logic
async fn run() -> anyhow::Result<ExitStatus> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    let config = AppConfig::load(cli.global.config.clone())
        .await
        .context("Failed to load configuration")?;

    init_logging(&cli, &config);
    info!("Artifact Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Fetch(args) => {
            info!("Executing fetch command");
            Ok(handle_fetch(args, &config, cli.global.quiet).await?)
        }
        Commands::Config(args) => {
            info!("Executing config command");
            handle_config(args, &config, cli.global.config.clone()).await?;
            Ok(ExitStatus::Success)
        }
    }
}

/// Initialize logging from CLI flags, falling back to the configured level
///
/// Logs go to stderr so stdout carries only status lines.
fn init_logging(cli: &Cli, config: &AppConfig) {
    let flags_given = cli.global.quiet || cli.global.verbose || cli.global.very_verbose;
    let level = if flags_given {
        cli.log_level().to_string().to_lowercase()
    } else {
        config.logging.level.clone()
    };

    let mut filter = EnvFilter::from_default_env();
    match format!("artifact_fetcher={}", level).parse::<Directive>() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log level '{}': {}", level, e),
    }

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
