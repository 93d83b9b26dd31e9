//! Command-line argument parsing for Artifact Fetcher
//!
//! This module defines the CLI structure using clap derive macros. Flags
//! given here override the matching settings from the configuration file.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

/// Artifact Fetcher - Download build artifacts by rule key
#[derive(Parser, Debug)]
#[command(
    name = "artifact_fetcher",
    version,
    about = "Download build artifacts from a directory or HTTP cache by rule key",
    long_about = "Fetches build artifacts from a content-addressed cache, one per 40-character hex rule key.
Fetches run concurrently, each key gets a status line, and a live display shows progress."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch artifacts for one or more rule keys
    Fetch(FetchArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for the fetch command
#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    /// Rule keys to fetch (40 hex characters each)
    #[arg(value_name = "KEY")]
    pub keys: Vec<String>,

    /// Directory artifacts are written to (default: a fresh temporary directory)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Use a local directory cache rooted here
    #[arg(long, value_name = "DIR", conflicts_with = "http_cache")]
    pub dir_cache: Option<PathBuf>,

    /// Use a remote HTTP cache at this base URL
    #[arg(long, value_name = "URL")]
    pub http_cache: Option<String>,

    /// Maximum number of concurrent fetches
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Abort the run after this long (e.g. "30s", "5m")
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Disable the live progress display
    #[arg(long)]
    pub no_progress: bool,

    /// Show one progress line per artifact
    #[arg(long)]
    pub details: bool,

    /// Print a JSON summary to stdout
    #[arg(long)]
    pub json: bool,
}

/// Arguments for config management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented default configuration file
    Init {
        /// Where to write the file (default: user config directory)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }
}

impl FetchArgs {
    /// Check flag combinations clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == Some(0) {
            return Err("Concurrency must be greater than 0".to_string());
        }

        if matches!(self.timeout, Some(t) if t.is_zero()) {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}
