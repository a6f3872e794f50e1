//! Fetcher configuration.

use std::time::Duration;

use icsfeed_core::ExcludedEvent;
use icsfeed_providers::{FeedAuth, FeedRequest};
use url::Url;

use crate::error::{FetcherError, FetcherResult};

/// Parameters of one feed. Fixed once the fetcher is built.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Feed location. `webcal://` is rewritten to `http://`.
    pub url: Url,

    /// Delay between successful retrievals.
    pub reload_interval: Duration,

    /// Events to hide.
    pub excluded_events: Vec<ExcludedEvent>,

    /// Maximum number of events published per cycle.
    pub maximum_entries: usize,

    /// Look-ahead horizon in days, counted from the start of today.
    pub maximum_number_of_days: u32,

    /// Credentials, if the feed needs them.
    pub auth: Option<FeedAuth>,

    /// Zone used for date-only and floating times and for the day
    /// boundaries of the window. `None` means the system zone.
    pub timezone: Option<chrono_tz::Tz>,

    /// HTTP request timeout.
    pub timeout: Duration,
}

impl FetcherConfig {
    pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(5 * 60);
    pub const DEFAULT_MAXIMUM_ENTRIES: usize = 10;
    pub const DEFAULT_MAXIMUM_NUMBER_OF_DAYS: u32 = 365;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    /// Floor applied by [`with_reload_interval`](Self::with_reload_interval).
    pub const MINIMUM_RELOAD_INTERVAL: Duration = Duration::from_secs(1);

    /// Creates a configuration for the feed at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or not http, https or webcal.
    pub fn new(url: impl AsRef<str>) -> FetcherResult<Self> {
        Ok(Self {
            url: parse_feed_url(url.as_ref())?,
            reload_interval: Self::DEFAULT_RELOAD_INTERVAL,
            excluded_events: Vec::new(),
            maximum_entries: Self::DEFAULT_MAXIMUM_ENTRIES,
            maximum_number_of_days: Self::DEFAULT_MAXIMUM_NUMBER_OF_DAYS,
            auth: None,
            timezone: None,
            timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    /// Sets the reload interval, raised to at least
    /// [`MINIMUM_RELOAD_INTERVAL`](Self::MINIMUM_RELOAD_INTERVAL).
    pub fn with_reload_interval(mut self, interval: Duration) -> Self {
        self.reload_interval = interval.max(Self::MINIMUM_RELOAD_INTERVAL);
        self
    }

    /// Sets the exclusion entries.
    pub fn with_excluded_events<I, E>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<ExcludedEvent>,
    {
        self.excluded_events = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the maximum number of published events.
    pub fn with_maximum_entries(mut self, entries: usize) -> Self {
        self.maximum_entries = entries;
        self
    }

    /// Sets the look-ahead horizon.
    pub fn with_maximum_number_of_days(mut self, days: u32) -> Self {
        self.maximum_number_of_days = days;
        self
    }

    /// Sets the credentials.
    pub fn with_auth(mut self, auth: FeedAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Pins the zone instead of using the system one.
    pub fn with_timezone(mut self, tz: chrono_tz::Tz) -> Self {
        self.timezone = Some(tz);
        self
    }

    /// Sets the HTTP request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The request sent on every cycle.
    pub fn request(&self) -> FeedRequest {
        FeedRequest::new(self.url.clone()).with_auth(self.auth.clone())
    }
}

fn parse_feed_url(raw: &str) -> FetcherResult<Url> {
    let invalid = |source| FetcherError::InvalidUrl {
        url: raw.to_string(),
        source,
    };
    let trimmed = raw.trim();
    let url = match trimmed.strip_prefix("webcal://") {
        Some(rest) => Url::parse(&format!("http://{}", rest)).map_err(invalid)?,
        None => Url::parse(trimmed).map_err(invalid)?,
    };
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetcherError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = FetcherConfig::new("https://example.com/cal.ics").unwrap();

        assert_eq!(config.url.as_str(), "https://example.com/cal.ics");
        assert_eq!(config.reload_interval, Duration::from_secs(300));
        assert_eq!(config.maximum_entries, 10);
        assert_eq!(config.maximum_number_of_days, 365);
        assert!(config.excluded_events.is_empty());
        assert!(config.auth.is_none());
        assert!(config.timezone.is_none());
    }

    #[test]
    fn builder() {
        let config = FetcherConfig::new("https://example.com/cal.ics")
            .unwrap()
            .with_reload_interval(Duration::from_millis(60_000))
            .with_excluded_events(["Lunch", "Standup"])
            .with_maximum_entries(2)
            .with_maximum_number_of_days(30)
            .with_auth(FeedAuth::bearer("tok"))
            .with_timezone(chrono_tz::Europe::Paris);

        assert_eq!(config.reload_interval, Duration::from_secs(60));
        assert_eq!(config.excluded_events.len(), 2);
        assert_eq!(config.maximum_entries, 2);
        assert_eq!(config.maximum_number_of_days, 30);
        assert_eq!(config.timezone, Some(chrono_tz::Europe::Paris));

        let request = config.request();
        assert_eq!(request.url, config.url);
        assert_eq!(request.auth, Some(FeedAuth::bearer("tok")));
    }

    #[test]
    fn reload_interval_has_a_floor() {
        let config = FetcherConfig::new("https://example.com/cal.ics")
            .unwrap()
            .with_reload_interval(Duration::ZERO);

        assert_eq!(config.reload_interval, FetcherConfig::MINIMUM_RELOAD_INTERVAL);
    }

    #[test]
    fn webcal_becomes_http() {
        let config = FetcherConfig::new("webcal://example.com/holidays.ics").unwrap();
        assert_eq!(config.url.as_str(), "http://example.com/holidays.ics");
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(matches!(
            FetcherConfig::new("not a url"),
            Err(FetcherError::InvalidUrl { .. })
        ));
        assert!(matches!(
            FetcherConfig::new("ftp://example.com/cal.ics"),
            Err(FetcherError::UnsupportedScheme(ref s)) if s == "ftp"
        ));
    }
}
