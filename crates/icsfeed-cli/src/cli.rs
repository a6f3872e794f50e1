//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// icsfeed - poll calendar feeds and print upcoming events
#[derive(Debug, Parser)]
#[command(name = "icsfeed")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "ICSFEED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Print each update as one JSON line
    #[arg(long)]
    pub json: bool,

    /// Write logs as JSON
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll every configured feed until interrupted (default)
    Run,
    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the configuration with secrets hidden
    Dump,
    /// Check feeds, exclusion rules and timezone
    Validate,
    /// Print the default configuration path
    Path,
}
