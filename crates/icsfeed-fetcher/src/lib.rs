//! Polling calendar-feed fetcher.
//!
//! A [`Fetcher`] owns one feed: it retrieves it on a schedule, retries
//! transient failures quickly, filters and orders the events, and hands the
//! resulting list to a listener or a `watch` channel.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod scheduler;

pub use config::FetcherConfig;
pub use error::{FetcherError, FetcherResult};
pub use fetcher::{EventList, Fetcher};
pub use pipeline::EventPipeline;
pub use scheduler::{
    Decision, FetchOutcome, MAX_FAILED_RETRIEVALS, RETRY_DELAY, RetryPolicy, Scheduler,
};
