//! CLI error types.

use std::path::PathBuf;

use icsfeed_core::TracingError;
use icsfeed_fetcher::FetcherError;
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read config {}: {source}", path.display())]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ParseConfig(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeConfig(#[from] toml::ser::Error),

    #[error("unknown timezone {0:?}")]
    InvalidTimezone(String),

    #[error("feed {url}: reload_interval must be greater than 0")]
    ZeroReloadInterval { url: String },

    #[error("no feeds configured")]
    NoFeeds,

    #[error("feed {url}: {source}")]
    Feed {
        url: String,
        #[source]
        source: FetcherError,
    },

    #[error("secret: {0}")]
    Secret(String),

    #[error(transparent)]
    Tracing(#[from] TracingError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
