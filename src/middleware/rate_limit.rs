//! Fixed-window rate limiting middleware.
//!
//! # Algorithm
//!
//! Every client key gets a counter in a shared [`CounterStore`]. Each request
//! increments its key's counter; once the counter exceeds the limit the
//! request is rejected with 429. A single background task resets *all*
//! counters every `window`, so every key shares one global window boundary.
//!
//! This is a fixed-window counter, not a sliding window or a token bucket.
//! A client can fit `limit` requests right before a boundary and another
//! `limit` right after it, i.e. up to twice the nominal rate over a short span.
//!
//! # Reset Task Lifecycle
//!
//! The reset task is started by [`RateLimitLayer::new`] and is owned by the
//! layer together with every [`RateLimitService`] it produced:
//!
//! - [`RateLimitLayer::shutdown`] stops it and waits for it to exit
//! - dropping the last layer/service clone cancels it
//!
//! # Response Headers
//!
//! On rate limit exceeded (429, JSON body with `error: rate_limited`):
//! - `Retry-After`: Window length in seconds, rounded up (at least 1)
//! - `X-RateLimit-Limit`: Configured requests per window
//! - `X-RateLimit-Remaining`: Always `0`
//!
//! Requests whose client key cannot be derived are rejected with 400 and
//! never touch the counters.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::{Layer, Service};
use tracing::{debug, trace, warn};

use super::client_key::{ClientKeyExtractor, PeerAddrKey};
use super::counter_store::CounterStore;
use super::request_id::RequestIdExt;
use crate::error::AppError;
use crate::metrics::record_request_outcome;

/// Error type for rate limit layer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// The request limit cannot be zero.
    ZeroLimit,
    /// The window cannot be zero-length.
    ZeroWindow,
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::ZeroLimit => {
                write!(
                    f,
                    "request limit must be greater than 0; leave the layer out for no limiting"
                )
            }
            RateLimitError::ZeroWindow => write!(f, "rate limit window must be greater than 0"),
        }
    }
}

impl std::error::Error for RateLimitError {}

/// Whole seconds until the window is over, rounded up and at least 1.
fn retry_after_secs(window: Duration) -> u64 {
    let secs = window.as_secs() + u64::from(window.subsec_nanos() > 0);
    secs.max(1)
}

/// Handle to the background task resetting the counters.
///
/// Shared by the layer and all its services; the task is cancelled when the
/// last handle goes away.
struct ResetTask {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl ResetTask {
    fn spawn(store: Arc<dyn CounterStore>, window: Duration) -> Self {
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        // First boundary one full window from now
        let mut ticker = interval_at(Instant::now() + window, window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let token = cancel.clone();
        tracker.spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => {
                        debug!("Rate limit reset task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        store.reset();
                        trace!("Rate limit window reset");
                    }
                }
            }

            debug!("Rate limit reset task shutting down");
        });
        tracker.close();

        Self { cancel, tracker }
    }

    async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.wait().await;
    }
}

impl Drop for ResetTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Rate limiting layer for Tower middleware stack.
///
/// Limits each client key to `limit` requests per fixed `window`.
///
/// # Example
///
/// ```rust,ignore
/// let store = Arc::new(InMemoryCounterStore::new());
/// let layer = RateLimitLayer::new(100, Duration::from_secs(1), store)?;
/// let app = Router::new()
///     .route("/", post(handler))
///     .layer(layer.clone());
/// // ... serve ...
/// layer.shutdown().await;
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    limit: u64,
    window: Duration,
    store: Arc<dyn CounterStore>,
    key_extractor: Arc<dyn ClientKeyExtractor>,
    reset_task: Arc<ResetTask>,
}

impl RateLimitLayer {
    /// Create a layer and start its periodic reset task.
    ///
    /// Clients are keyed by peer address; see [`Self::with_key_extractor`].
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::ZeroLimit` if `limit` is 0 and
    /// `RateLimitError::ZeroWindow` if `window` is zero.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime, since it spawns the reset task.
    pub fn new(
        limit: u32,
        window: Duration,
        store: Arc<dyn CounterStore>,
    ) -> Result<Self, RateLimitError> {
        if limit == 0 {
            return Err(RateLimitError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(RateLimitError::ZeroWindow);
        }

        let reset_task = ResetTask::spawn(Arc::clone(&store), window);

        Ok(Self {
            limit: u64::from(limit),
            window,
            store,
            key_extractor: Arc::new(PeerAddrKey),
            reset_task: Arc::new(reset_task),
        })
    }

    /// Replace the client key derivation strategy.
    pub fn with_key_extractor(mut self, key_extractor: Arc<dyn ClientKeyExtractor>) -> Self {
        self.key_extractor = key_extractor;
        self
    }

    /// Configured requests per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Configured window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Stop the reset task and wait for it to exit.
    ///
    /// Counters are no longer reset afterwards, so a layer that is still
    /// serving traffic will eventually reject every known client.
    pub async fn shutdown(&self) {
        self.reset_task.shutdown().await;
    }

    /// Whether the reset task has been stopped.
    pub fn is_shut_down(&self) -> bool {
        self.reset_task.cancel.is_cancelled()
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limit: self.limit,
            window: self.window,
            store: self.store.clone(),
            key_extractor: self.key_extractor.clone(),
            _reset_task: self.reset_task.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limit: u64,
    window: Duration,
    store: Arc<dyn CounterStore>,
    key_extractor: Arc<dyn ClientKeyExtractor>,
    _reset_task: Arc<ResetTask>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // Derive the key and count the request before moving req
        let client_key = match self.key_extractor.client_key(&req) {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    error = %e,
                    path = %req.uri().path(),
                    request_id = req.request_id().unwrap_or("-"),
                    "Cannot derive client key"
                );
                record_request_outcome("bad_client_key");
                let response = AppError::BadRequest(e.to_string()).into_response();
                return Box::pin(async move { Ok(response) });
            }
        };

        let current = self.store.increment(&client_key);

        if current > self.limit {
            warn!(
                client_key = %client_key,
                path = %req.uri().path(),
                request_id = req.request_id().unwrap_or("-"),
                count = current,
                limit = self.limit,
                "Rate limit exceeded"
            );
            record_request_outcome("rate_limited");

            let response = AppError::RateLimited {
                limit: self.limit,
                retry_after_secs: retry_after_secs(self.window),
            }
            .into_response();

            return Box::pin(async move { Ok(response) });
        }

        record_request_outcome("accepted");

        // Swap in a fresh clone so the instance polled ready is the one called
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(req).await })
    }
}
