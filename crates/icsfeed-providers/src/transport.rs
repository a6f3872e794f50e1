//! The seam between the fetcher and the network.
//!
//! [`FeedTransport`] performs one retrieval. The fetcher only sees
//! [`FeedResponse`]s and [`ProviderError`]s, so tests can script both
//! without a server.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use url::Url;

use crate::auth::FeedAuth;
use crate::error::{ProviderError, ProviderResult};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("icsfeed/", env!("CARGO_PKG_VERSION"));

/// A boxed future, so the transport trait stays object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One retrieval to perform.
#[derive(Debug, Clone)]
pub struct FeedRequest {
    /// Feed location.
    pub url: Url,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Credentials, if the feed needs them.
    pub auth: Option<FeedAuth>,
}

impl FeedRequest {
    /// A request carrying the default headers.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: vec![("User-Agent".to_string(), USER_AGENT.to_string())],
            auth: None,
        }
    }

    /// Builder method to attach credentials.
    pub fn with_auth(mut self, auth: Option<FeedAuth>) -> Self {
        self.auth = auth;
        self
    }

    /// Builder method to add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Looks up a header, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status and body of a completed retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedResponse {
    pub status: u16,
    pub body: String,
}

impl FeedResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Only 200 counts as success.
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Returns the body of a successful response.
    ///
    /// # Errors
    ///
    /// Any status other than 200 becomes [`ProviderError::http_status`].
    pub fn into_body(self) -> ProviderResult<String> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(ProviderError::http_status(self.status))
        }
    }
}

/// Retrieves a feed body.
pub trait FeedTransport: Send + Sync {
    /// Performs one retrieval.
    ///
    /// Returns whatever status the server answered with; deciding whether it
    /// is a success is left to the caller. Errors are for requests that
    /// produced no response at all.
    fn fetch<'a>(&'a self, request: &'a FeedRequest) -> BoxFuture<'a, ProviderResult<FeedResponse>>;
}

impl<T: FeedTransport + ?Sized> FeedTransport for Arc<T> {
    fn fetch<'a>(&'a self, request: &'a FeedRequest) -> BoxFuture<'a, ProviderResult<FeedResponse>> {
        (**self).fetch(request)
    }
}
