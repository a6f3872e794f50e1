//! Exclusion rules for hiding events by title or identifier.
//!
//! Rules come from configuration as [`ExcludedEvent`] entries, either a
//! plain string or a table:
//!
//! ```toml
//! excluded_events = [
//!     "Lunch",
//!     { filter_by = "^Standup", regex = true },
//!     { filter_by = "Bin day", until = "1 day" },
//! ]
//! ```
//!
//! They are compiled once into an [`ExclusionSet`] when a fetcher is built.

use chrono::{DateTime, TimeDelta, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::CalendarEvent;

/// Errors raised while compiling exclusion rules.
#[derive(Debug, Error)]
pub enum ExclusionError {
    /// The pattern of a regex rule does not compile.
    #[error("invalid exclusion pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The `until` period is not of the form `<n> <unit>`.
    #[error("invalid exclusion period {0:?} (expected e.g. \"3 days\")")]
    InvalidPeriod(String),
}

/// One configured exclusion entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExcludedEvent {
    /// Case-insensitive substring of the title, or the exact event UID.
    Title(String),
    /// A rule with explicit matching options.
    Filter {
        /// Text, pattern or UID to match.
        filter_by: String,
        /// Match case exactly.
        #[serde(default)]
        case_sensitive: bool,
        /// Treat `filter_by` as a regular expression.
        #[serde(default)]
        regex: bool,
        /// Only hide the event while it starts later than now plus this period.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        until: Option<String>,
    },
}

impl From<&str> for ExcludedEvent {
    fn from(title: &str) -> Self {
        Self::Title(title.to_string())
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Substring { needle: String, case_sensitive: bool },
    Pattern(Regex),
}

/// A compiled exclusion rule.
#[derive(Debug, Clone)]
pub struct ExclusionRule {
    filter_by: String,
    matcher: Matcher,
    until: Option<TimeDelta>,
}

impl ExclusionRule {
    /// Compiles one configured entry.
    pub fn compile(entry: &ExcludedEvent) -> Result<Self, ExclusionError> {
        match entry {
            ExcludedEvent::Title(title) => Ok(Self {
                filter_by: title.clone(),
                matcher: Matcher::Substring {
                    needle: title.to_lowercase(),
                    case_sensitive: false,
                },
                until: None,
            }),
            ExcludedEvent::Filter {
                filter_by,
                case_sensitive,
                regex,
                until,
            } => {
                let matcher = if *regex {
                    let pattern = RegexBuilder::new(filter_by)
                        .case_insensitive(!case_sensitive)
                        .build()
                        .map_err(|source| ExclusionError::InvalidPattern {
                            pattern: filter_by.clone(),
                            source,
                        })?;
                    Matcher::Pattern(pattern)
                } else if *case_sensitive {
                    Matcher::Substring {
                        needle: filter_by.clone(),
                        case_sensitive: true,
                    }
                } else {
                    Matcher::Substring {
                        needle: filter_by.to_lowercase(),
                        case_sensitive: false,
                    }
                };
                let until = until.as_deref().map(parse_period).transpose()?;
                Ok(Self {
                    filter_by: filter_by.clone(),
                    matcher,
                    until,
                })
            }
        }
    }

    /// Returns true if the rule's text or pattern matches `title`.
    pub fn matches_title(&self, title: &str) -> bool {
        match &self.matcher {
            Matcher::Substring {
                needle,
                case_sensitive: true,
            } => title.contains(needle.as_str()),
            Matcher::Substring { needle, .. } => title.to_lowercase().contains(needle.as_str()),
            Matcher::Pattern(pattern) => pattern.is_match(title),
        }
    }

    /// Returns true if this rule hides `event` at `now`.
    pub fn excludes(&self, event: &CalendarEvent, now: DateTime<Utc>) -> bool {
        let hit = self.matches_title(&event.title)
            || event.uid.as_deref() == Some(self.filter_by.as_str());
        if !hit {
            return false;
        }
        match self.until {
            // Every event starts within a period that reaches past the representable range.
            Some(until) => now
                .checked_add_signed(until)
                .is_some_and(|limit| event.start_date > limit),
            None => true,
        }
    }
}

/// All exclusion rules of one feed.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    rules: Vec<ExclusionRule>,
}

impl ExclusionSet {
    /// Compiles every entry, failing on the first invalid one.
    pub fn compile(entries: &[ExcludedEvent]) -> Result<Self, ExclusionError> {
        let rules = entries
            .iter()
            .map(ExclusionRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Returns true if any rule hides `event` at `now`.
    pub fn excludes(&self, event: &CalendarEvent, now: DateTime<Utc>) -> bool {
        self.rules.iter().any(|rule| rule.excludes(event, now))
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Parses an `until` period such as `"3 days"` or `"1 hour"`.
pub fn parse_period(text: &str) -> Result<TimeDelta, ExclusionError> {
    let invalid = || ExclusionError::InvalidPeriod(text.to_string());
    let mut parts = text.split_whitespace();
    let amount: i64 = parts
        .next()
        .and_then(|n| n.parse().ok())
        .filter(|n| *n >= 0)
        .ok_or_else(invalid)?;
    let unit = parts.next().ok_or_else(invalid)?.to_lowercase();
    if parts.next().is_some() {
        return Err(invalid());
    }

    let delta = match unit.trim_end_matches('s') {
        "minute" => TimeDelta::try_minutes(amount),
        "hour" => TimeDelta::try_hours(amount),
        "day" => TimeDelta::try_days(amount),
        "week" => TimeDelta::try_weeks(amount),
        _ => None,
    };
    delta.ok_or_else(invalid)
}
