//! Daemon configuration.
//!
//! Read from `~/.config/icsfeed/config.toml` unless `--config` says
//! otherwise:
//!
//! ```toml
//! timezone = "Europe/Paris"
//!
//! [[feeds]]
//! name = "work"
//! url = "https://example.com/work.ics"
//! reload_interval = 300000
//! maximum_entries = 5
//! maximum_number_of_days = 14
//! excluded_events = ["Lunch", { filter_by = "^OOO", regex = true }]
//!
//! [feeds.auth]
//! method = "digest"
//! user = "alice"
//! pass = "env::WORK_CAL_PASSWORD"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use icsfeed_core::ExcludedEvent;
use icsfeed_fetcher::FetcherConfig;
use icsfeed_providers::FeedAuth;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};
use crate::secret;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Log at debug level.
    pub debug: bool,

    /// IANA zone for date-only events and day boundaries. Defaults to the
    /// system zone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    pub feeds: Vec<FeedSettings>,
}

/// One `[[feeds]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    /// Label used in output. Defaults to the URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub url: String,

    /// Milliseconds between successful retrievals.
    #[serde(default = "default_reload_interval")]
    pub reload_interval: u64,

    #[serde(default)]
    pub excluded_events: Vec<ExcludedEvent>,

    #[serde(default = "default_maximum_entries")]
    pub maximum_entries: usize,

    #[serde(default = "default_maximum_number_of_days")]
    pub maximum_number_of_days: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<FeedAuth>,
}

fn default_reload_interval() -> u64 {
    FetcherConfig::DEFAULT_RELOAD_INTERVAL.as_millis() as u64
}

fn default_maximum_entries() -> usize {
    FetcherConfig::DEFAULT_MAXIMUM_ENTRIES
}

fn default_maximum_number_of_days() -> u32 {
    FetcherConfig::DEFAULT_MAXIMUM_NUMBER_OF_DAYS
}

impl FeedSettings {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    /// Builds the fetcher configuration, resolving secret references in
    /// the credentials.
    pub fn fetcher_config(&self, timezone: Option<chrono_tz::Tz>) -> CliResult<FetcherConfig> {
        if self.reload_interval == 0 {
            return Err(CliError::ZeroReloadInterval {
                url: self.url.clone(),
            });
        }
        let mut config = FetcherConfig::new(&self.url)
            .map_err(|source| CliError::Feed {
                url: self.url.clone(),
                source,
            })?
            .with_reload_interval(Duration::from_millis(self.reload_interval))
            .with_excluded_events(self.excluded_events.iter().cloned())
            .with_maximum_entries(self.maximum_entries)
            .with_maximum_number_of_days(self.maximum_number_of_days);

        if let Some(ref auth) = self.auth {
            let mut auth = auth.clone();
            auth.pass = secret::resolve(&auth.pass)?;
            config = config.with_auth(auth);
        }
        if let Some(tz) = timezone {
            config = config.with_timezone(tz);
        }
        Ok(config)
    }
}

impl CliConfig {
    /// Loads the default file, or an empty configuration if it does not exist.
    pub fn load() -> CliResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("icsfeed")
            .join("config.toml")
    }

    pub fn timezone(&self) -> CliResult<Option<chrono_tz::Tz>> {
        self.timezone
            .as_deref()
            .map(|name| {
                name.parse::<chrono_tz::Tz>()
                    .map_err(|_| CliError::InvalidTimezone(name.to_string()))
            })
            .transpose()
    }

    /// One fetcher configuration per feed, labelled.
    pub fn fetcher_configs(&self) -> CliResult<Vec<(String, FetcherConfig)>> {
        if self.feeds.is_empty() {
            return Err(CliError::NoFeeds);
        }
        let tz = self.timezone()?;
        self.feeds
            .iter()
            .map(|feed| Ok((feed.label().to_string(), feed.fetcher_config(tz)?)))
            .collect()
    }
}
