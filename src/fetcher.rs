//! Outbound fetch capability.
//!
//! The orchestrator needs exactly one thing from the outside world: given a
//! URL, produce the response body or an error. [`Fetcher`] is that seam;
//! [`HttpFetcher`] implements it with `reqwest`, and tests plug in their own.
//!
//! No timeout is imposed here beyond the one configured on the underlying
//! client (see [`HttpFetcher::new`]). A fetch that never completes holds up
//! its request until the client gives up.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use axum::body::Bytes;
use thiserror::Error;
use url::Url;

/// Failure of a single fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be sent or the response head never arrived.
    #[error("GET '{url}': {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response arrived but its body could not be read.
    #[error("read response body of '{url}': {source}")]
    ReadBody {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The task running the fetch died before producing a result.
    #[error("fetch task for '{url}' failed: {reason}")]
    Aborted { url: String, reason: String },

    /// Failure reported by a non-HTTP fetcher.
    #[error("fetch '{url}' failed: {reason}")]
    Other { url: String, reason: String },
}

impl FetchError {
    /// URL the failed fetch was for.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Request { url, .. }
            | FetchError::ReadBody { url, .. }
            | FetchError::Aborted { url, .. }
            | FetchError::Other { url, .. } => url,
        }
    }
}

/// Boxed future returned by [`Fetcher::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Bytes, FetchError>> + Send + 'a>>;

/// Boxed future returned by [`Fetcher::fetch_len`].
pub type FetchLenFuture<'a> = Pin<Box<dyn Future<Output = Result<usize, FetchError>> + Send + 'a>>;

/// Capability to fetch a URL and return its full response body.
///
/// Object safe so it can be shared as `Arc<dyn Fetcher>` between fan-out tasks.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a Url) -> FetchFuture<'a>;

    /// Length of the response body in bytes.
    ///
    /// Defaults to buffering through [`Fetcher::fetch`]; implementations that
    /// can count while streaming should override it.
    fn fetch_len<'a>(&'a self, url: &'a Url) -> FetchLenFuture<'a> {
        Box::pin(async move { self.fetch(url).await.map(|body| body.len()) })
    }
}

/// [`Fetcher`] backed by a shared `reqwest::Client`.
///
/// Issues a GET and returns the body whatever the status code; an error page
/// is still a response with a size. [`Fetcher::fetch_len`] counts the body
/// chunk by chunk without holding it in memory.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher with an optional total timeout per fetch.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    pub fn new(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self::from_client(builder.build()?))
    }

    /// Wrap an existing client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response, FetchError> {
        self.client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a Url) -> FetchFuture<'a> {
        Box::pin(async move {
            let response = self.get(url).await?;

            response.bytes().await.map_err(|source| FetchError::ReadBody {
                url: url.to_string(),
                source,
            })
        })
    }

    fn fetch_len<'a>(&'a self, url: &'a Url) -> FetchLenFuture<'a> {
        Box::pin(async move {
            let mut response = self.get(url).await?;
            let read_error = |source: reqwest::Error| FetchError::ReadBody {
                url: url.to_string(),
                source,
            };

            let mut len = 0usize;
            while let Some(chunk) = response.chunk().await.map_err(read_error)? {
                len += chunk.len();
            }
            Ok(len)
        })
    }
}
