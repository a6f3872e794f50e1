//! Errors raised while building a fetcher.
//!
//! Once running, a fetcher never fails: retrieval errors go through the
//! retry policy and the error listener instead.

use icsfeed_core::ExclusionError;
use icsfeed_providers::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetcherError {
    /// The feed URL does not parse.
    #[error("invalid feed URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The feed URL uses a scheme other than http, https or webcal.
    #[error("unsupported URL scheme {0:?}")]
    UnsupportedScheme(String),

    /// An exclusion rule does not compile.
    #[error(transparent)]
    Exclusion(#[from] ExclusionError),

    /// The transport could not be set up.
    #[error("failed to set up transport: {0}")]
    Transport(#[from] ProviderError),
}

/// A specialized Result type for fetcher construction.
pub type FetcherResult<T> = Result<T, FetcherError>;
