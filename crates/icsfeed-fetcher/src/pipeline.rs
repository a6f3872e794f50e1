//! From feed body to the published event list.

use chrono::{DateTime, TimeZone, Utc};
use icsfeed_core::{CalendarEvent, ExclusionSet, LookAheadWindow};
use icsfeed_providers::{RawEvent, expand_recurrences, normalize_events, parse_feed};
use tracing::{debug, warn};

/// The per-feed filtering rules, applied synchronously after retrieval.
#[derive(Debug, Clone, Default)]
pub struct EventPipeline {
    pub exclusions: ExclusionSet,
    pub maximum_entries: usize,
    pub maximum_number_of_days: u32,
}

impl EventPipeline {
    /// Parses `body` and filters the result.
    ///
    /// A body that does not parse yields no events, which callers treat the
    /// same as an empty feed.
    pub fn build<Tz: TimeZone>(&self, body: &str, now: DateTime<Utc>, tz: &Tz) -> Vec<CalendarEvent> {
        match parse_feed(body) {
            Ok(raw) => self.apply(raw, now, tz),
            Err(e) => {
                warn!(error = %e, "Feed body could not be parsed");
                Vec::new()
            }
        }
    }

    /// Expands, normalizes, excludes, windows, sorts by start and truncates.
    ///
    /// Events with equal starts keep their feed order.
    pub fn apply<Tz: TimeZone>(
        &self,
        raw: Vec<RawEvent>,
        now: DateTime<Utc>,
        tz: &Tz,
    ) -> Vec<CalendarEvent> {
        let window = LookAheadWindow::new(now, self.maximum_number_of_days, tz);
        let parsed = raw.len();
        let raw = expand_recurrences(raw, window.now(), window.future(), tz);

        let mut events = normalize_events(&raw, tz);
        events.retain(|event| !self.exclusions.excludes(event, now));
        window.retain(&mut events);
        events.sort_by_key(|event| event.start_date);
        events.truncate(self.maximum_entries);

        debug!(
            parsed,
            kept = events.len(),
            future = %window.future(),
            "Filtered feed events"
        );
        events
    }
}
