//! The `icsfeed` daemon: reads a TOML file listing calendar feeds, polls
//! each one with a [`Fetcher`](icsfeed_fetcher::Fetcher) and prints every
//! update.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;
pub mod secret;

pub use cli::Cli;
pub use error::{CliError, CliResult};
