//! Core types: calendar events, look-ahead window, exclusion rules, tracing

pub mod event;
pub mod exclude;
pub mod tracing;
pub mod window;

pub use event::{CalendarEvent, Geo, truncate_to_millis};
pub use exclude::{ExcludedEvent, ExclusionError, ExclusionRule, ExclusionSet, parse_period};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use window::{LookAheadWindow, is_local_midnight, local_midnight, start_of_day};
