use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, instrument};
use url::Url;

use super::collector::ResultCollector;
use crate::fetcher::{FetchError, Fetcher};
use crate::metrics::record_fetch;

/// Outcome of fetching one batch.
#[derive(Debug)]
pub struct FetchReport {
    /// Rendered sizes of the successful fetches, in completion order.
    pub body: String,
    /// Number of successful fetches (lines in `body`).
    pub recorded: usize,
    /// Every failed fetch, in completion order.
    pub failures: Vec<FetchError>,
}

impl FetchReport {
    /// The failure that completed first, if any.
    pub fn first_error(&self) -> Option<&FetchError> {
        self.failures.first()
    }

    /// Whether every URL of the batch was fetched successfully.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fans a batch of URLs out to concurrent fetches and joins on all of them.
///
/// # Concurrency
///
/// One Tokio task per URL is spawned into a per-call `JoinSet`. [`run`]
/// returns only after every task has finished, so the report is always
/// complete. With a `max_in_flight` limit, tasks wait on a semaphore that is
/// local to the call; batches never compete with each other for permits.
///
/// A failing fetch does not cancel its siblings. It is recorded in
/// [`FetchReport::failures`] and contributes no size.
///
/// [`run`]: FetchOrchestrator::run
#[derive(Clone)]
pub struct FetchOrchestrator {
    fetcher: Arc<dyn Fetcher>,
    max_in_flight: Option<usize>,
}

impl FetchOrchestrator {
    /// Create an orchestrator with unbounded per-batch concurrency.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            max_in_flight: None,
        }
    }

    /// Cap concurrent fetches per batch. `None` or `Some(0)` means unbounded.
    pub fn with_max_in_flight(mut self, limit: Option<usize>) -> Self {
        self.max_in_flight = limit.filter(|&n| n > 0);
        self
    }

    pub fn max_in_flight(&self) -> Option<usize> {
        self.max_in_flight
    }

    /// Fetch every URL concurrently and collect the body sizes.
    #[instrument(skip(self, urls), fields(urls = urls.len()))]
    pub async fn run(&self, urls: Vec<Url>) -> FetchReport {
        let collector = Arc::new(ResultCollector::with_capacity(urls.len()));
        let permits = self.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));

        let mut tasks = JoinSet::new();
        let mut task_urls = HashMap::with_capacity(urls.len());

        for url in urls {
            let fetcher = Arc::clone(&self.fetcher);
            let collector = Arc::clone(&collector);
            let permits = permits.clone();
            let task_url = url.to_string();

            let handle = tasks.spawn(
                async move {
                    // Held until this fetch is done
                    let _permit = match permits {
                        Some(semaphore) => Some(semaphore.acquire_owned().await.map_err(|e| {
                            FetchError::Aborted {
                                url: url.to_string(),
                                reason: e.to_string(),
                            }
                        })?),
                        None => None,
                    };

                    let started = Instant::now();
                    let result = fetcher.fetch_len(&url).await;
                    record_fetch(result.is_ok(), started.elapsed().as_secs_f64());

                    collector.add(result?).await;
                    Ok::<_, FetchError>(())
                }
                .in_current_span(),
            );
            task_urls.insert(handle.id(), task_url);
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((_, Err(e))) => {
                    debug!(error = %e, "Fetch failed");
                    failures.push(e);
                }
                Err(join_error) => {
                    let url = task_urls.remove(&join_error.id()).unwrap_or_default();
                    debug!(url = %url, error = %join_error, "Fetch task died");
                    failures.push(FetchError::Aborted {
                        url,
                        reason: join_error.to_string(),
                    });
                }
            }
        }

        FetchReport {
            recorded: collector.len().await,
            body: collector.render().await,
            failures,
        }
    }
}
