//! Look-ahead window filtering.
//!
//! A [`LookAheadWindow`] is built from the instant a cycle runs and the
//! configured number of days. It keeps events that have not yet ended and
//! that start no later than one second before local midnight `days` days
//! after today.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};

use crate::event::CalendarEvent;

/// Returns the instant of local midnight on `date` in `tz`.
///
/// When midnight does not exist (a DST gap at 00:00) the earliest valid
/// instant of that local hour is used; if the zone cannot map it at all the
/// date is taken as UTC midnight.
pub fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => tz
            .from_local_datetime(&(naive + TimeDelta::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    }
}

/// Returns the instant the local day containing `now` began.
pub fn start_of_day<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    local_midnight(now.with_timezone(tz).date_naive(), tz)
}

/// Returns true if `dt` falls exactly on a local midnight in `tz`.
pub fn is_local_midnight<Tz: TimeZone>(dt: DateTime<Utc>, tz: &Tz) -> bool {
    dt.with_timezone(tz).time() == NaiveTime::MIN
}

/// The range of instants a cycle considers relevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookAheadWindow {
    now: DateTime<Utc>,
    future: DateTime<Utc>,
}

impl LookAheadWindow {
    /// Builds the window for `now` with a horizon of `days` local calendar days.
    ///
    /// `future = start_of_day(now) + days - 1s`. Days are added in local
    /// time, so a DST change inside the horizon does not shift the boundary
    /// off midnight.
    pub fn new<Tz: TimeZone>(now: DateTime<Utc>, days: u32, tz: &Tz) -> Self {
        let today = now.with_timezone(tz).date_naive();
        let boundary = today
            .checked_add_days(Days::new(u64::from(days)))
            .map(|date| local_midnight(date, tz))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            now,
            future: boundary - TimeDelta::seconds(1),
        }
    }

    /// The instant the window was built for.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The latest start instant still admitted.
    pub fn future(&self) -> DateTime<Utc> {
        self.future
    }

    /// Returns true if an event spanning `start..end` belongs in the window.
    ///
    /// Both bounds are inclusive on the keep side: an event ending exactly
    /// at `now` or starting exactly at `future` is kept.
    pub fn admits(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        end >= self.now && start <= self.future
    }

    /// Returns true if `event` belongs in the window.
    pub fn admits_event(&self, event: &CalendarEvent) -> bool {
        self.admits(event.start_date, event.end_date)
    }

    /// Drops every event outside the window, keeping the relative order of the rest.
    pub fn retain(&self, events: &mut Vec<CalendarEvent>) {
        events.retain(|event| self.admits_event(event));
    }
}
