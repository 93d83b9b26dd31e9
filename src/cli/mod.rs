//! Command-line interface components
//!
//! This module contains CLI-specific code for the Artifact Fetcher
//! application: argument parsing, command handlers and the live display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{Cli, Commands, ConfigAction, ConfigArgs, FetchArgs, GlobalArgs};
pub use commands::{handle_config, handle_fetch, resolve_fetch_settings, FetchSettings};
pub use progress::ProgressDisplay;
