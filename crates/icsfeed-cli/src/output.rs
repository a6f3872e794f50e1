//! Rendering of published event lists.

use chrono::TimeZone;
use icsfeed_core::CalendarEvent;
use serde_json::json;

/// How updates are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    /// One JSON object per update.
    Json,
}

/// Renders one update of feed `label`, with times shown in `tz`.
pub fn render<Tz>(label: &str, events: &[CalendarEvent], format: OutputFormat, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match format {
        OutputFormat::Json => json!({ "feed": label, "events": events }).to_string(),
        OutputFormat::Text => {
            let mut out = format!("{} ({} events)", label, events.len());
            for event in events {
                out.push('\n');
                out.push_str(&text_line(event, tz));
            }
            out
        }
    }
}

fn text_line<Tz>(event: &CalendarEvent, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let start = event.start_date.with_timezone(tz);
    let title = if event.title.is_empty() {
        "(no title)"
    } else {
        event.title.as_str()
    };

    let mut line = if event.full_day_event {
        format!("  {}  all day      {}", start.format("%Y-%m-%d"), title)
    } else {
        let end = event.end_date.with_timezone(tz);
        format!(
            "  {}  {}-{}  {}",
            start.format("%Y-%m-%d"),
            start.format("%H:%M"),
            end.format("%H:%M"),
            title
        )
    };
    if let Some(ref location) = event.location {
        line.push_str(&format!(" @ {}", location));
    }
    line
}
