//! HTTP(S) feed transport.

mod challenge;
mod client;

pub use challenge::{DigestChallenge, basic_header, bearer_header, preemptive_header};
pub use client::{DEFAULT_TIMEOUT, HttpTransport};
