//! Feed retrieval and decoding.
//!
//! This crate turns a remote iCalendar feed into [`CalendarEvent`]s:
//!
//! ```text
//!   FeedTransport ──► body ──► parse_feed ──► RawEvent
//!                                               │
//!                                               ▼ expand_recurrences()
//!                                            RawEvent (occurrences)
//!                                               │
//!                                               ▼ normalize_event()
//!                                            CalendarEvent
//! ```
//!
//! - [`FeedTransport`] - the network seam, with [`HttpTransport`] as the
//!   reqwest implementation (feature `http`)
//! - [`parse_feed`] - iCalendar body to [`RawEvent`]s
//! - [`expand_recurrences`] - `RRULE` expansion
//! - [`normalize_event`] - raw event to [`CalendarEvent`]
//!
//! [`CalendarEvent`]: icsfeed_core::CalendarEvent

pub mod auth;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod ics;
pub mod normalize;
pub mod raw_event;
pub mod recurrence;
pub mod transport;

pub use auth::{AuthMethod, FeedAuth};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use ics::parse_feed;
pub use normalize::{normalize_event, normalize_events};
pub use raw_event::{RawEvent, RawEventTime};
pub use recurrence::{expand_master, expand_recurrences};
pub use transport::{BoxFuture, FeedRequest, FeedResponse, FeedTransport, USER_AGENT};
