//! Subcommand implementations.

use std::sync::Arc;

use chrono::Local;
use icsfeed_core::ExclusionSet;
use icsfeed_fetcher::{Fetcher, FetcherConfig};
use tracing::{error, info};

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, render};

/// Starts one fetcher per feed and prints every update until Ctrl-C.
pub async fn run(config: &CliConfig, format: OutputFormat) -> CliResult<()> {
    let tz = config.timezone()?;
    let mut fetchers = Vec::new();

    for (label, fetcher_config) in config.fetcher_configs()? {
        let url = fetcher_config.url.to_string();
        let fetcher =
            Fetcher::new(fetcher_config).map_err(|source| CliError::Feed { url, source })?;

        let label: Arc<str> = label.into();
        fetcher.on_receive(move |f| {
            let events = f.events();
            let text = match tz {
                Some(tz) => render(&label, &events, format, &tz),
                None => render(&label, &events, format, &Local),
            };
            println!("{}", text);
        });
        fetcher.on_error(|f, e| {
            error!(url = %f.url(), error = %e, "Feed unavailable, retrying at the reload interval");
        });
        fetcher.start_fetch();
        fetchers.push(fetcher);
    }

    info!(feeds = fetchers.len(), "Polling feeds");
    tokio::signal::ctrl_c().await?;
    info!("Interrupted, exiting");
    Ok(())
}

/// Prints the configuration as TOML with passwords hidden.
pub fn dump(config: &CliConfig) -> CliResult<()> {
    let mut redacted = config.clone();
    for feed in &mut redacted.feeds {
        if let Some(ref mut auth) = feed.auth {
            auth.pass = "<redacted>".to_string();
        }
    }
    println!("# {}", CliConfig::default_path().display());
    println!("{}", toml::to_string_pretty(&redacted)?);
    Ok(())
}

/// Checks that every feed would start.
pub fn validate(config: &CliConfig) -> CliResult<()> {
    for (label, fetcher_config) in config.fetcher_configs()? {
        check_feed(&fetcher_config)?;
        println!("{}: ok ({})", label, fetcher_config.url);
    }
    println!("Configuration is valid.");
    Ok(())
}

fn check_feed(config: &FetcherConfig) -> CliResult<()> {
    ExclusionSet::compile(&config.excluded_events).map_err(|e| CliError::Feed {
        url: config.url.to_string(),
        source: e.into(),
    })?;
    Ok(())
}

pub fn path() -> CliResult<()> {
    println!("{}", CliConfig::default_path().display());
    Ok(())
}
