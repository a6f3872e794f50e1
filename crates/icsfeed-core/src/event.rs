//! The canonical calendar event record.
//!
//! [`CalendarEvent`] is what every fetch cycle publishes. Start and end are
//! absolute instants kept at millisecond precision and serialized as epoch
//! milliseconds, so consumers see the same numbers the feed produced.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A geographic position taken from the `GEO` property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
}

impl Geo {
    /// Creates a new position.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A calendar event as published to listeners.
///
/// Optional fields are passed through verbatim from the feed; an absent
/// property stays `None` rather than being defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    /// The event summary.
    pub title: String,

    /// When the event starts.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_date: DateTime<Utc>,

    /// When the event ends.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_date: DateTime<Utc>,

    /// Whether the event covers whole calendar days.
    pub full_day_event: bool,

    /// Classification tag (`PUBLIC`, `PRIVATE`, `CONFIDENTIAL`, ...).
    pub class: Option<String>,

    /// Free-form location.
    pub location: Option<String>,

    /// Geographic position.
    pub geo: Option<Geo>,

    /// Free-form description.
    pub description: Option<String>,

    /// The feed's identifier for this event (`UID`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl CalendarEvent {
    /// Creates a timed event. Start and end are truncated to milliseconds.
    pub fn new(title: impl Into<String>, start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            start_date: truncate_to_millis(start_date),
            end_date: truncate_to_millis(end_date),
            full_day_event: false,
            class: None,
            location: None,
            geo: None,
            description: None,
            uid: None,
        }
    }

    /// Builder: mark the event as full-day (or not).
    pub fn with_full_day(mut self, full_day: bool) -> Self {
        self.full_day_event = full_day;
        self
    }

    /// Builder: set the classification tag.
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Builder: set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Builder: set the geographic position.
    pub fn with_geo(mut self, geo: Geo) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Builder: set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder: set the source identifier.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Start as milliseconds since the Unix epoch.
    pub fn start_date_ms(&self) -> i64 {
        self.start_date.timestamp_millis()
    }

    /// End as milliseconds since the Unix epoch.
    pub fn end_date_ms(&self) -> i64 {
        self.end_date.timestamp_millis()
    }

    /// Time between start and end.
    pub fn duration(&self) -> TimeDelta {
        self.end_date - self.start_date
    }
}

/// Drops sub-millisecond precision from an instant.
pub fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn new_truncates_to_milliseconds() {
        let start = utc(2025, 3, 1, 9, 0) + TimeDelta::nanoseconds(1_234_567);
        let event = CalendarEvent::new("Standup", start, start);

        assert_eq!(event.start_date_ms() % 1000, 1);
        assert_eq!(event.start_date.timestamp_subsec_nanos(), 1_000_000);
    }

    #[test]
    fn optional_fields_default_to_absent() {
        let event = CalendarEvent::new("Standup", utc(2025, 3, 1, 9, 0), utc(2025, 3, 1, 9, 15));

        assert!(!event.full_day_event);
        assert!(event.class.is_none());
        assert!(event.location.is_none());
        assert!(event.geo.is_none());
        assert!(event.description.is_none());
        assert!(event.uid.is_none());
        assert_eq!(event.duration(), TimeDelta::minutes(15));
    }

    #[test]
    fn serializes_with_epoch_millis() {
        let event = CalendarEvent::new("Review", utc(2025, 3, 1, 9, 0), utc(2025, 3, 1, 10, 0))
            .with_class("PUBLIC")
            .with_geo(Geo::new(52.5, 13.4));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["title"], "Review");
        assert_eq!(json["startDate"], 1_740_819_600_000_i64);
        assert_eq!(json["endDate"], 1_740_823_200_000_i64);
        assert_eq!(json["fullDayEvent"], false);
        assert_eq!(json["class"], "PUBLIC");
        assert_eq!(json["geo"]["lat"], 52.5);
        assert!(json["location"].is_null());
        assert!(json.get("uid").is_none());
    }
}
