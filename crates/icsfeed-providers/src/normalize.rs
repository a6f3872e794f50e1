//! Conversion of raw feed events into [`CalendarEvent`]s.

use chrono::{TimeDelta, TimeZone};
use icsfeed_core::{CalendarEvent, is_local_midnight};

use crate::raw_event::RawEvent;

/// Converts one raw event, resolving local times in `local`.
///
/// A missing `DTEND` gives a zero-length event, or a one-day event when the
/// start is date-only. A missing summary gives an empty title. When the
/// feed does not say whether the event is full-day, it is full-day if the
/// start is date-only, or if it lasts exactly 24 hours from local midnight.
pub fn normalize_event<Tz: TimeZone>(raw: &RawEvent, local: &Tz) -> CalendarEvent {
    let start = raw.start.resolve(local);
    let end = match &raw.end {
        Some(end) => end.resolve(local),
        None if raw.start.is_date_only() => start + TimeDelta::days(1),
        None => start,
    };

    let full_day = raw.full_day.unwrap_or_else(|| {
        raw.start.is_date_only()
            || (end - start == TimeDelta::hours(24) && is_local_midnight(start, local))
    });

    CalendarEvent {
        full_day_event: full_day,
        class: raw.class.clone(),
        location: raw.location.clone(),
        geo: raw.geo,
        description: raw.description.clone(),
        uid: raw.uid.clone(),
        ..CalendarEvent::new(raw.summary.clone().unwrap_or_default(), start, end)
    }
}

/// Converts every raw event, keeping feed order.
pub fn normalize_events<Tz: TimeZone>(raw: &[RawEvent], local: &Tz) -> Vec<CalendarEvent> {
    raw.iter().map(|event| normalize_event(event, local)).collect()
}
