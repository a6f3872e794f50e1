//! Raw event data as read from a feed, before normalization.
//!
//! [`RawEvent`] keeps the timing information exactly as the feed expressed
//! it (date-only, UTC, floating or zoned) so the normalizer can decide
//! whether an event is full-day and resolve local times against the
//! configured zone.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use icsfeed_core::{Geo, local_midnight};
use serde::{Deserialize, Serialize};

/// A start, end or exception time as written in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum RawEventTime {
    /// `VALUE=DATE`: a whole calendar day, no time-of-day.
    Date(NaiveDate),
    /// A UTC instant (`...Z`).
    Utc(DateTime<Utc>),
    /// A floating local time, interpreted in the reader's zone.
    Floating(NaiveDateTime),
    /// A local time in a named IANA zone (`TZID=...`).
    Zoned {
        date_time: NaiveDateTime,
        tzid: String,
    },
}

impl RawEventTime {
    /// Returns true if the value has date-only precision.
    pub fn is_date_only(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Resolves the value to an instant.
    ///
    /// Dates map to local midnight in `local`; floating times are read in
    /// `local`; zoned times use their TZID, falling back to `local` when the
    /// zone is unknown.
    pub fn resolve<Tz: TimeZone>(&self, local: &Tz) -> DateTime<Utc> {
        match self {
            Self::Date(date) => local_midnight(*date, local),
            Self::Utc(dt) => *dt,
            Self::Floating(naive) => resolve_local(naive, local),
            Self::Zoned { date_time, tzid } => match tzid.parse::<chrono_tz::Tz>() {
                Ok(zone) => resolve_local(date_time, &zone),
                Err(_) => resolve_local(date_time, local),
            },
        }
    }
}

fn resolve_local<Tz: TimeZone>(naive: &NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    tz.from_local_datetime(naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

/// A `VEVENT` as read from the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// `UID`.
    pub uid: Option<String>,

    /// `SUMMARY`.
    pub summary: Option<String>,

    /// `DTSTART`.
    pub start: RawEventTime,

    /// `DTEND`, if present.
    pub end: Option<RawEventTime>,

    /// Full-day flag supplied by the feed itself, when it carries one.
    pub full_day: Option<bool>,

    /// `CLASS`.
    pub class: Option<String>,

    /// `LOCATION`.
    pub location: Option<String>,

    /// `GEO`.
    pub geo: Option<Geo>,

    /// `DESCRIPTION`.
    pub description: Option<String>,

    /// `RRULE`, verbatim.
    pub rrule: Option<String>,

    /// `EXDATE` values.
    #[serde(default)]
    pub exdates: Vec<RawEventTime>,

    /// `RECURRENCE-ID`, set on instances overriding one occurrence of a series.
    pub recurrence_id: Option<RawEventTime>,
}

impl RawEvent {
    /// Creates a raw event with only a start time.
    pub fn new(start: RawEventTime) -> Self {
        Self {
            uid: None,
            summary: None,
            start,
            end: None,
            full_day: None,
            class: None,
            location: None,
            geo: None,
            description: None,
            rrule: None,
            exdates: Vec::new(),
            recurrence_id: None,
        }
    }

    /// Returns true if the event carries a recurrence rule.
    pub fn is_recurring(&self) -> bool {
        self.rrule.is_some()
    }

    /// Builder method to set the UID.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Builder method to set the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Builder method to set the end.
    pub fn with_end(mut self, end: RawEventTime) -> Self {
        self.end = Some(end);
        self
    }

    /// Builder method to set the feed-supplied full-day flag.
    pub fn with_full_day(mut self, full_day: bool) -> Self {
        self.full_day = Some(full_day);
        self
    }

    /// Builder method to set the classification.
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Builder method to set the position.
    pub fn with_geo(mut self, geo: Geo) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder method to set the recurrence rule.
    pub fn with_rrule(mut self, rrule: impl Into<String>) -> Self {
        self.rrule = Some(rrule.into());
        self
    }

    /// Builder method to add an exception date.
    pub fn with_exdate(mut self, exdate: RawEventTime) -> Self {
        self.exdates.push(exdate);
        self
    }
}
