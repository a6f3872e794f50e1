//! iCalendar feed parsing.
//!
//! This module reads an RFC 5545 document with the `icalendar` parser and
//! turns every `VEVENT` into a [`RawEvent`]. It does not filter or expand
//! anything; that happens later in the pipeline.

use icalendar::DatePerhapsTime;
use icalendar::parser::{Component, Property, read_calendar, unfold};
use icsfeed_core::Geo;
use tracing::{debug, trace};

use crate::error::{ProviderError, ProviderResult};
use crate::raw_event::{RawEvent, RawEventTime};

/// Outlook/Exchange marker for whole-day events.
const ALL_DAY_MARKER: &str = "X-MICROSOFT-CDO-ALLDAYEVENT";

/// Parses a feed body into raw events.
///
/// # Errors
///
/// Returns a parse error if the body is not an iCalendar document.
/// Individual `VEVENT`s without a usable `DTSTART` are skipped.
pub fn parse_feed(body: &str) -> ProviderResult<Vec<RawEvent>> {
    let body = body.trim_start_matches('\u{feff}');
    if !body.contains("BEGIN:VCALENDAR") {
        return Err(ProviderError::parse("body is not an iCalendar document"));
    }

    let unfolded = unfold(body);
    let calendar = read_calendar(&unfolded)
        .map_err(|e| ProviderError::parse(format!("failed to parse iCalendar: {:?}", e)))?;

    let mut vevents = Vec::new();
    collect_vevents(&calendar.components, &mut vevents);

    let events: Vec<RawEvent> = vevents.into_iter().filter_map(parse_vevent).collect();
    debug!(count = events.len(), "Parsed events from feed");
    Ok(events)
}

fn collect_vevents<'a, 'b>(components: &'b [Component<'a>], out: &mut Vec<&'b Component<'a>>) {
    for component in components {
        if component.name == "VEVENT" {
            out.push(component);
        } else {
            collect_vevents(&component.components, out);
        }
    }
}

fn parse_vevent(vevent: &Component<'_>) -> Option<RawEvent> {
    let uid = text_prop(vevent, "UID");
    let Some(start) = vevent.find_prop("DTSTART").and_then(parse_time) else {
        debug!(uid = ?uid, "Skipping VEVENT without a usable DTSTART");
        return None;
    };

    let mut raw = RawEvent::new(start);
    raw.uid = uid;
    raw.summary = text_prop(vevent, "SUMMARY");
    raw.end = vevent.find_prop("DTEND").and_then(parse_time);
    raw.class = text_prop(vevent, "CLASS");
    raw.location = text_prop(vevent, "LOCATION");
    raw.description = text_prop(vevent, "DESCRIPTION");
    raw.geo = vevent
        .find_prop("GEO")
        .and_then(|p| parse_geo(p.val.as_ref()));
    raw.full_day = vevent
        .find_prop(ALL_DAY_MARKER)
        .map(|p| p.val.as_ref().eq_ignore_ascii_case("TRUE"));
    raw.rrule = vevent.find_prop("RRULE").map(|p| p.val.to_string());
    raw.exdates = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate)
        .collect();
    raw.recurrence_id = vevent.find_prop("RECURRENCE-ID").and_then(parse_time);

    trace!(uid = ?raw.uid, summary = ?raw.summary, start = ?raw.start, "Parsed VEVENT");
    Some(raw)
}

fn text_prop(component: &Component<'_>, name: &str) -> Option<String> {
    component
        .find_prop(name)
        .map(|p| unescape_text(p.val.as_ref()))
}

fn parse_time(prop: &Property<'_>) -> Option<RawEventTime> {
    DatePerhapsTime::try_from(prop).ok().map(convert_time)
}

fn convert_time(value: DatePerhapsTime) -> RawEventTime {
    use icalendar::CalendarDateTime;

    match value {
        DatePerhapsTime::Date(date) => RawEventTime::Date(date),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => RawEventTime::Utc(dt),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => {
            RawEventTime::Floating(naive)
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            RawEventTime::Zoned { date_time, tzid }
        }
    }
}

/// Parses one `EXDATE` property, which may hold several comma-separated values.
fn parse_exdate(prop: &Property<'_>) -> Vec<RawEventTime> {
    let param = |key: &str| {
        prop.params
            .iter()
            .find(|p| p.key == key)
            .and_then(|p| p.val.as_ref().map(|v| v.to_string()))
    };
    let tzid = param("TZID");
    let is_date = param("VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"));

    let value: &str = prop.val.as_ref();
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            if is_date || (s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit())) {
                return chrono::NaiveDate::parse_from_str(s, "%Y%m%d")
                    .ok()
                    .map(RawEventTime::Date);
            }
            if let Some(utc) = s.strip_suffix('Z') {
                return chrono::NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| RawEventTime::Utc(dt.and_utc()));
            }
            let naive = chrono::NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S").ok()?;
            Some(match tzid {
                Some(ref tzid) => RawEventTime::Zoned {
                    date_time: naive,
                    tzid: tzid.clone(),
                },
                None => RawEventTime::Floating(naive),
            })
        })
        .collect()
}

/// Parses a `GEO` value (`lat;lon`).
fn parse_geo(value: &str) -> Option<Geo> {
    let (lat, lon) = value.split_once(';')?;
    let lat = lat.trim().parse().ok()?;
    let lon = lon.trim().parse().ok()?;
    Some(Geo::new(lat, lon))
}

/// Undoes RFC 5545 TEXT escaping (`\\`, `\;`, `\,`, `\n`).
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
