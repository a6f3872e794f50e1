//! icsfeed CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use icsfeed_core::{TracingConfig, TracingOutputFormat, init_tracing};
use tracing::Level;

use icsfeed_cli::cli::{Cli, Command, ConfigAction};
use icsfeed_cli::commands;
use icsfeed_cli::config::CliConfig;
use icsfeed_cli::error::CliResult;
use icsfeed_cli::output::OutputFormat;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = match cli.config {
        Some(ref path) => CliConfig::load_from(path)?,
        None => CliConfig::load()?,
    };

    let tracing = if cli.debug || config.debug {
        TracingConfig::debug()
    } else {
        TracingConfig::default().with_level(Level::INFO)
    };
    let format = if cli.log_json {
        TracingOutputFormat::Json
    } else {
        TracingOutputFormat::Compact
    };
    init_tracing(tracing.with_format(format))?;

    let output = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        None | Some(Command::Run) => commands::run(&config, output).await,
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::dump(&config),
            ConfigAction::Validate => commands::validate(&config),
            ConfigAction::Path => commands::path(),
        },
    }
}
