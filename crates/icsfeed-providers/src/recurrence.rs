//! Expansion of recurring events into concrete occurrences.
//!
//! A master event (one with an `RRULE`) is replaced by one [`RawEvent`] per
//! occurrence inside the requested range. `EXDATE`s are honored, and an
//! occurrence is dropped when the feed carries an override for it (a
//! `VEVENT` with the same UID and a matching `RECURRENCE-ID`).

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use rrule::RRuleSet;
use tracing::{debug, warn};

use crate::raw_event::{RawEvent, RawEventTime};

/// Upper bound on occurrences generated for a single master.
const MAX_OCCURRENCES: u16 = 1000;

/// Expands every recurring event in `events` over `[range_start, range_end]`.
///
/// Non-recurring events and overrides pass through unchanged. A master
/// whose rule cannot be parsed is kept as a single event.
pub fn expand_recurrences<Tz: TimeZone>(
    events: Vec<RawEvent>,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    local: &Tz,
) -> Vec<RawEvent> {
    let overridden: HashSet<(String, DateTime<Utc>)> = events
        .iter()
        .filter_map(|e| {
            let uid = e.uid.clone()?;
            let id = e.recurrence_id.as_ref()?;
            Some((uid, id.resolve(local)))
        })
        .collect();

    let mut out = Vec::with_capacity(events.len());
    for event in events {
        if !event.is_recurring() || event.recurrence_id.is_some() {
            out.push(event);
            continue;
        }
        match expand_master(&event, range_start, range_end) {
            Ok(occurrences) => {
                debug!(uid = ?event.uid, count = occurrences.len(), "Expanded recurring event");
                out.extend(occurrences.into_iter().filter(|occ| {
                    let (Some(uid), Some(id)) = (&occ.uid, &occ.recurrence_id) else {
                        return true;
                    };
                    !overridden.contains(&(uid.clone(), id.resolve(local)))
                }));
            }
            Err(e) => {
                warn!(uid = ?event.uid, error = %e, "Cannot expand recurrence, keeping master only");
                let mut single = event;
                single.rrule = None;
                single.exdates.clear();
                out.push(single);
            }
        }
    }
    out
}

/// Expands one master event.
///
/// Occurrences are generated when they intersect the range, so the lower
/// bound is moved back by the master's duration. The range is also widened
/// by a day on each side so floating and date-only
/// occurrences, which the rule engine sees as UTC, are not lost near the
/// edges. Callers filter the result against the exact window afterwards.
pub fn expand_master(
    master: &RawEvent,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> Result<Vec<RawEvent>, rrule::RRuleError> {
    let Some(rule) = master.rrule.as_deref() else {
        return Ok(vec![master.clone()]);
    };

    let set: RRuleSet = rule_set_source(master, rule).parse()?;

    let tz: rrule::Tz = Utc.into();
    let slack = TimeDelta::days(1) + TimeDelta::seconds(1);
    let after = range_start
        .checked_sub_signed(master_duration(master) + slack)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
        .with_timezone(&tz);
    let before = range_end
        .checked_add_signed(slack)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .with_timezone(&tz);
    let result = set.after(after).before(before).all(MAX_OCCURRENCES);
    if result.limited {
        warn!(uid = ?master.uid, limit = MAX_OCCURRENCES, "Recurrence expansion truncated");
    }

    Ok(result
        .dates
        .iter()
        .map(|dt| occurrence(master, dt))
        .collect())
}

fn master_duration(master: &RawEvent) -> TimeDelta {
    let start = master.start.resolve(&Utc);
    match &master.end {
        Some(end) => (end.resolve(&Utc) - start).max(TimeDelta::zero()),
        None if master.start.is_date_only() => TimeDelta::days(1),
        None => TimeDelta::zero(),
    }
}

/// Builds the text handed to the rule engine.
///
/// Date-only and floating values, and zones `chrono-tz` does not know, are
/// written as UTC wall-clock times. They are read back with `naive_local`
/// and resolved against the configured zone afterwards, the same way
/// [`RawEventTime::resolve`] falls back.
fn rule_set_source(master: &RawEvent, rule: &str) -> String {
    let mut lines = Vec::with_capacity(master.exdates.len() + 2);
    lines.push(format_time("DTSTART", &master.start));
    lines.push(format!("RRULE:{}", rewrite_until(rule, &master.start)));
    lines.extend(master.exdates.iter().map(|t| format_time("EXDATE", t)));
    lines.join("\n")
}

fn known_zone(tzid: &str) -> Option<chrono_tz::Tz> {
    tzid.parse().ok()
}

fn format_time(name: &str, time: &RawEventTime) -> String {
    match time {
        RawEventTime::Date(d) => format!("{}:{}T000000Z", name, d.format("%Y%m%d")),
        RawEventTime::Utc(dt) => format!("{}:{}", name, dt.format("%Y%m%dT%H%M%SZ")),
        RawEventTime::Floating(dt) => format!("{}:{}Z", name, dt.format("%Y%m%dT%H%M%S")),
        RawEventTime::Zoned { date_time, tzid } => match known_zone(tzid) {
            Some(zone) => format!(
                "{};TZID={}:{}",
                name,
                zone.name(),
                date_time.format("%Y%m%dT%H%M%S")
            ),
            None => format!("{}:{}Z", name, date_time.format("%Y%m%dT%H%M%S")),
        },
    }
}

/// Writes a non-UTC `UNTIL` in the same frame as `DTSTART`.
///
/// A date `UNTIL` covers its whole day for timed series. In a known zone
/// the local value is converted to UTC; everywhere else it is taken as a
/// UTC wall-clock time like `DTSTART`.
fn rewrite_until(rule: &str, start: &RawEventTime) -> String {
    rule.split(';')
        .map(|part| {
            let Some((key, value)) = part.split_once('=') else {
                return part.to_string();
            };
            if !key.eq_ignore_ascii_case("UNTIL") || value.ends_with(['Z', 'z']) {
                return part.to_string();
            }
            let until = if let Ok(date) = NaiveDate::parse_from_str(value, "%Y%m%d") {
                if start.is_date_only() {
                    date.and_time(NaiveTime::MIN)
                } else {
                    date.and_hms_opt(23, 59, 59).unwrap_or(date.and_time(NaiveTime::MIN))
                }
            } else if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S") {
                dt
            } else {
                return part.to_string();
            };
            let until = match start {
                RawEventTime::Zoned { tzid, .. } => match known_zone(tzid) {
                    Some(zone) => zone
                        .from_local_datetime(&until)
                        .earliest()
                        .map(|dt| dt.naive_utc())
                        .unwrap_or(until),
                    None => until,
                },
                _ => until,
            };
            format!("{}={}", key, until.format("%Y%m%dT%H%M%SZ"))
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Maps an occurrence back onto the master's time representation.
///
/// Occurrences of a series in an unknown zone come back in UTC, whose local
/// time is the wall-clock time written in the feed.
fn occurrence_time(dt: &DateTime<rrule::Tz>, master_start: &RawEventTime) -> RawEventTime {
    match master_start {
        RawEventTime::Date(_) => RawEventTime::Date(dt.date_naive()),
        RawEventTime::Utc(_) => RawEventTime::Utc(dt.with_timezone(&Utc)),
        RawEventTime::Floating(_) => RawEventTime::Floating(dt.naive_local()),
        RawEventTime::Zoned { tzid, .. } => RawEventTime::Zoned {
            date_time: dt.naive_local(),
            tzid: tzid.clone(),
        },
    }
}

fn occurrence(master: &RawEvent, dt: &DateTime<rrule::Tz>) -> RawEvent {
    let start = occurrence_time(dt, &master.start);
    let end = master.end.as_ref().map(|end| shift(&master.start, end, &start));

    let mut event = master.clone();
    event.rrule = None;
    event.exdates.clear();
    event.recurrence_id = Some(start.clone());
    event.start = start;
    event.end = end;
    event
}

/// Moves `end` so that it keeps its offset from `master_start` relative to `start`.
fn shift(master_start: &RawEventTime, end: &RawEventTime, start: &RawEventTime) -> RawEventTime {
    match (master_start, end, start) {
        (RawEventTime::Date(ms), RawEventTime::Date(me), RawEventTime::Date(s)) => {
            RawEventTime::Date(*s + (*me - *ms))
        }
        (RawEventTime::Utc(ms), RawEventTime::Utc(me), RawEventTime::Utc(s)) => {
            RawEventTime::Utc(*s + (*me - *ms))
        }
        (RawEventTime::Floating(ms), RawEventTime::Floating(me), RawEventTime::Floating(s)) => {
            RawEventTime::Floating(*s + (*me - *ms))
        }
        (
            RawEventTime::Zoned { date_time: ms, .. },
            RawEventTime::Zoned { date_time: me, .. },
            RawEventTime::Zoned { date_time: s, tzid },
        ) => RawEventTime::Zoned {
            date_time: *s + (*me - *ms),
            tzid: tzid.clone(),
        },
        // Mixed representations: keep the duration measured in UTC.
        _ => {
            let duration = end.resolve(&Utc) - master_start.resolve(&Utc);
            RawEventTime::Utc(start.resolve(&Utc) + duration)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn weekly_standup() -> RawEvent {
        RawEvent::new(RawEventTime::Utc(utc(2025, 1, 6, 9, 0)))
            .with_uid("standup@example.com")
            .with_summary("Standup")
            .with_end(RawEventTime::Utc(utc(2025, 1, 6, 9, 30)))
            .with_rrule("FREQ=WEEKLY;BYDAY=MO")
    }

    #[test]
    fn expands_weekly_rule_with_duration() {
        let events = expand_master(
            &weekly_standup(),
            utc(2025, 1, 6, 0, 0),
            utc(2025, 1, 27, 23, 59),
        )
        .unwrap();

        let starts: Vec<_> = events.iter().map(|e| e.start.clone()).collect();
        assert!(starts.contains(&RawEventTime::Utc(utc(2025, 1, 6, 9, 0))));
        assert!(starts.contains(&RawEventTime::Utc(utc(2025, 1, 27, 9, 0))));
        for event in &events {
            assert!(!event.is_recurring());
            assert_eq!(event.recurrence_id.as_ref(), Some(&event.start));
            let (RawEventTime::Utc(s), Some(RawEventTime::Utc(e))) = (&event.start, &event.end)
            else {
                panic!("unexpected time representation");
            };
            assert_eq!(*e - *s, TimeDelta::minutes(30));
        }
    }

    #[test]
    fn honors_exdates() {
        let master = weekly_standup().with_exdate(RawEventTime::Utc(utc(2025, 1, 13, 9, 0)));
        let events = expand_master(&master, utc(2025, 1, 6, 0, 0), utc(2025, 1, 20, 23, 59))
            .unwrap();

        assert!(
            !events
                .iter()
                .any(|e| e.start == RawEventTime::Utc(utc(2025, 1, 13, 9, 0)))
        );
        assert!(
            events
                .iter()
                .any(|e| e.start == RawEventTime::Utc(utc(2025, 1, 20, 9, 0)))
        );
    }

    #[test]
    fn override_replaces_generated_occurrence() {
        let mut moved = RawEvent::new(RawEventTime::Utc(utc(2025, 1, 13, 11, 0)))
            .with_uid("standup@example.com")
            .with_summary("Standup (moved)");
        moved.recurrence_id = Some(RawEventTime::Utc(utc(2025, 1, 13, 9, 0)));

        let events = expand_recurrences(
            vec![weekly_standup(), moved],
            utc(2025, 1, 13, 0, 0),
            utc(2025, 1, 13, 23, 59),
            &Utc,
        );

        let on_13th: Vec<_> = events
            .iter()
            .filter(|e| e.start.resolve(&Utc).date_naive() == NaiveDate::from_ymd_opt(2025, 1, 13).unwrap())
            .collect();
        assert_eq!(on_13th.len(), 1);
        assert_eq!(on_13th[0].summary.as_deref(), Some("Standup (moved)"));
    }

    #[test]
    fn date_only_series_stays_date_only() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let master = RawEvent::new(RawEventTime::Date(start))
            .with_end(RawEventTime::Date(start.succ_opt().unwrap()))
            .with_rrule("FREQ=DAILY;COUNT=3");

        let events = expand_master(&master, utc(2025, 3, 1, 0, 0), utc(2025, 3, 10, 0, 0)).unwrap();

        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.start.is_date_only()));
        assert_eq!(
            events[2].end,
            Some(RawEventTime::Date(NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()))
        );
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn last_start(events: &[RawEvent]) -> Option<&RawEventTime> {
        events.iter().map(|e| &e.start).max_by_key(|t| t.resolve(&Utc))
    }

    #[test]
    fn date_only_series_with_date_until() {
        let master = RawEvent::new(RawEventTime::Date(date(2025, 1, 6)))
            .with_end(RawEventTime::Date(date(2025, 1, 7)))
            .with_rrule("FREQ=DAILY;UNTIL=20250401");

        let events = expand_master(&master, utc(2025, 3, 28, 0, 0), utc(2025, 4, 10, 0, 0)).unwrap();

        assert!(events.iter().all(|e| e.start.is_date_only()));
        assert!(events.iter().any(|e| e.start == RawEventTime::Date(date(2025, 3, 30))));
        assert_eq!(last_start(&events), Some(&RawEventTime::Date(date(2025, 4, 1))));
    }

    #[test]
    fn floating_series_with_floating_until() {
        let nine = |d: NaiveDate| d.and_hms_opt(9, 0, 0).unwrap();
        let master = RawEvent::new(RawEventTime::Floating(nine(date(2025, 1, 6))))
            .with_end(RawEventTime::Floating(nine(date(2025, 1, 6)) + TimeDelta::hours(1)))
            .with_rrule("FREQ=DAILY;UNTIL=20250401T090000");

        let events = expand_master(&master, utc(2025, 3, 28, 0, 0), utc(2025, 4, 10, 0, 0)).unwrap();

        assert!(
            events
                .iter()
                .any(|e| e.start == RawEventTime::Floating(nine(date(2025, 3, 30))))
        );
        assert_eq!(
            last_start(&events),
            Some(&RawEventTime::Floating(nine(date(2025, 4, 1))))
        );
    }

    #[test]
    fn unknown_zone_series_keeps_wall_clock_time() {
        let tzid = "W. Europe Standard Time".to_string();
        let at = |d: NaiveDate, h: u32| RawEventTime::Zoned {
            date_time: d.and_hms_opt(h, 0, 0).unwrap(),
            tzid: tzid.clone(),
        };
        let master = RawEvent::new(at(date(2025, 1, 6), 9))
            .with_end(at(date(2025, 1, 6), 10))
            .with_rrule("FREQ=DAILY");

        let events = expand_master(&master, utc(2025, 3, 10, 0, 0), utc(2025, 3, 12, 0, 0)).unwrap();

        let occurrence = events
            .iter()
            .find(|e| e.start == at(date(2025, 3, 10), 9))
            .expect("occurrence on March 10th");
        assert_eq!(occurrence.end, Some(at(date(2025, 3, 10), 10)));
    }

    #[test]
    fn zoned_until_is_converted_to_utc() {
        let start = RawEventTime::Zoned {
            date_time: date(2025, 1, 6).and_hms_opt(9, 0, 0).unwrap(),
            tzid: "Europe/Paris".to_string(),
        };

        assert_eq!(
            rewrite_until("FREQ=DAILY;UNTIL=20250401T090000;INTERVAL=2", &start),
            "FREQ=DAILY;UNTIL=20250401T070000Z;INTERVAL=2"
        );
        assert_eq!(
            rewrite_until("FREQ=DAILY;UNTIL=20250401T070000Z", &start),
            "FREQ=DAILY;UNTIL=20250401T070000Z"
        );
        assert_eq!(
            rewrite_until("FREQ=WEEKLY;UNTIL=20250401", &RawEventTime::Utc(utc(2025, 1, 6, 9, 0))),
            "FREQ=WEEKLY;UNTIL=20250401T235959Z"
        );
    }

    #[test]
    fn unbounded_range_does_not_overflow() {
        let master = weekly_standup().with_rrule("FREQ=DAILY");

        let events = expand_master(
            &master,
            DateTime::<Utc>::MIN_UTC,
            DateTime::<Utc>::MAX_UTC - TimeDelta::seconds(1),
        )
        .unwrap();

        assert!(!events.is_empty());
        assert!(events.len() <= usize::from(MAX_OCCURRENCES));
        assert_eq!(events[0].start, RawEventTime::Utc(utc(2025, 1, 6, 9, 0)));
    }

    #[test]
    fn invalid_rule_keeps_master() {
        let master = weekly_standup().with_rrule("FREQ=SOMETIMES");
        let events = expand_recurrences(
            vec![master],
            utc(2025, 1, 1, 0, 0),
            utc(2025, 2, 1, 0, 0),
            &Utc,
        );

        assert_eq!(events.len(), 1);
        assert!(!events[0].is_recurring());
        assert_eq!(events[0].start, RawEventTime::Utc(utc(2025, 1, 6, 9, 0)));
    }

    #[test]
    fn plain_events_pass_through() {
        let plain = RawEvent::new(RawEventTime::Utc(utc(2025, 1, 6, 9, 0))).with_summary("One-off");
        let events = expand_recurrences(
            vec![plain.clone()],
            utc(2025, 1, 1, 0, 0),
            utc(2025, 2, 1, 0, 0),
            &Utc,
        );
        assert_eq!(events, vec![plain]);
    }
}
