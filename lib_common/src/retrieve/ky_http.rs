//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest`. It includes optional
//! middleware retries and standardized JSON response handling.
//!
//! Non-2xx responses are *not* errors: they come back as an `ApiResponse` with
//! `success == false` so callers can branch on the status (a polling feed
//! treats 403/404 as "no active session"). Only transport failures and
//! undecodable 2xx bodies surface as `FetchError`.

use reqwest::header::HeaderMap;
use reqwest::Url;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

/// Default bound on a single request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure classes of a single request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest_middleware::Error),

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("HTTP {status}: response is not valid JSON: {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
}

/// The decoded body of a 2xx response, or just the status otherwise.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The deserialized body; `None` for non-2xx statuses.
    pub data: Option<T>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
}

/// A JSON `GET` client with default headers, a per-request timeout and
/// optional transient retries.
#[derive(Clone, Debug)]
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL (relative request paths are joined to it).
    /// * `headers` - Headers sent with every request (user agent, origin, ...).
    /// * `timeout` - Bound on each request, connection included.
    /// * `max_retries` - Transient-failure retries; `0` disables the middleware.
    pub fn new(
        base_url: &str,
        headers: HeaderMap,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, FetchError> {
        let url = Url::parse(base_url)?;

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;

        let mut builder = ClientBuilder::new(client);
        if max_retries > 0 {
            let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
            builder = builder.with(RetryTransientMiddleware::new_with_policy(retry_policy));
        }

        Ok(Self {
            inner: builder.build(),
            base_url: url,
        })
    }

    /// `GET`s `path` (joined to the base URL; empty means the base URL itself)
    /// and decodes a 2xx body as JSON. Non-2xx statuses come back with
    /// `success == false` and no body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>, FetchError> {
        let full_url = if path.is_empty() {
            self.base_url.clone()
        } else {
            self.base_url.join(path)?
        };

        let response: reqwest::Response = self.inner.get(full_url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Ok(ApiResponse {
                data: None,
                status: status.as_u16(),
                success: false,
            });
        }

        // Read as text first so a bad body is a Decode error, not a transport one.
        let text = response.text().await.map_err(FetchError::Body)?;
        let data = serde_json::from_str::<T>(&text).map_err(|source| FetchError::Decode {
            status: status.as_u16(),
            source,
        })?;
        Ok(ApiResponse {
            data: Some(data),
            status: status.as_u16(),
            success: true,
        })
    }
}
