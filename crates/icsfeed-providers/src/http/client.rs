//! reqwest-backed [`FeedTransport`].

use std::time::Duration;

use reqwest::{Client, Response, StatusCode, header};
use tokio::sync::Mutex;
use tracing::{debug, trace};
use url::Url;

use super::challenge::{DigestChallenge, basic_header, bearer_header, preemptive_header};
use crate::auth::{AuthMethod, FeedAuth};
use crate::error::{ProviderError, ProviderResult};
use crate::transport::{BoxFuture, FeedRequest, FeedResponse, FeedTransport, USER_AGENT};

/// Request timeout used by [`HttpTransport::new`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches feeds over HTTP(S) with optional Basic, Digest or Bearer auth.
///
/// With `send_immediately` the credentials go out with the first request.
/// Otherwise the request is sent bare and repeated once with credentials
/// when the server answers 401. The last Digest challenge is remembered so
/// following cycles can answer it up front.
pub struct HttpTransport {
    client: Client,
    digest: Mutex<Option<DigestChallenge>>,
}

impl HttpTransport {
    pub fn new() -> ProviderResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("Failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;

        Ok(Self {
            client,
            digest: Mutex::new(None),
        })
    }

    async fn retrieve(&self, request: &FeedRequest) -> ProviderResult<FeedResponse> {
        let Some(auth) = request.auth.as_ref() else {
            let response = self.send(request, None).await?;
            return read_response(response).await;
        };

        let first = self.first_authorization(request, auth).await;
        let sent_credentials = first.is_some();
        let response = self.send(request, first).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return read_response(response).await;
        }

        // Servers may offer several challenges; the first Digest MD5 one is answered.
        let challenge = response
            .headers()
            .get_all(header::WWW_AUTHENTICATE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(DigestChallenge::from_header);
        debug!(url = %request.url, method = ?auth.method, "Received 401, answering challenge");

        let authorization = match auth.method {
            AuthMethod::Digest => {
                let Some(mut digest) = challenge else {
                    return Err(ProviderError::authentication(
                        "Server did not send a Digest MD5 challenge",
                    ));
                };
                let value = digest.respond("GET", &request_uri(&request.url), &auth.user, &auth.pass);
                *self.digest.lock().await = Some(digest);
                value
            }
            _ if sent_credentials => {
                return Err(ProviderError::authentication("Credentials were rejected"));
            }
            AuthMethod::Basic => basic_header(&auth.user, &auth.pass),
            AuthMethod::Bearer => bearer_header(&auth.pass),
        };

        let response = self.send(request, Some(authorization)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::authentication("Credentials were rejected"));
        }
        read_response(response).await
    }

    /// The `Authorization` value for the first attempt, if any.
    async fn first_authorization(&self, request: &FeedRequest, auth: &FeedAuth) -> Option<String> {
        if auth.method == AuthMethod::Digest {
            let mut cached = self.digest.lock().await;
            if let Some(digest) = cached.as_mut() {
                return Some(digest.respond("GET", &request_uri(&request.url), &auth.user, &auth.pass));
            }
            return None;
        }
        if auth.sends_immediately() {
            preemptive_header(auth)
        } else {
            None
        }
    }

    async fn send(
        &self,
        request: &FeedRequest,
        authorization: Option<String>,
    ) -> ProviderResult<Response> {
        let mut builder = self.client.get(request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }

        trace!(url = %request.url, "Sending request");
        builder.send().await.map_err(|e| {
            ProviderError::network(format!("Request to {} failed: {}", request.url, e)).with_source(e)
        })
    }
}

impl FeedTransport for HttpTransport {
    fn fetch<'a>(&'a self, request: &'a FeedRequest) -> BoxFuture<'a, ProviderResult<FeedResponse>> {
        Box::pin(self.retrieve(request))
    }
}

async fn read_response(response: Response) -> ProviderResult<FeedResponse> {
    let status = response.status().as_u16();
    trace!(status, "Received response");
    let body = response.text().await.map_err(|e| {
        ProviderError::network(format!("Failed to read response: {}", e)).with_source(e)
    })?;
    Ok(FeedResponse { status, body })
}

/// Path and query, as used in the Digest `uri` field.
fn request_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
