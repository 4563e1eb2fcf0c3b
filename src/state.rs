//! Shared application state for Axum handlers.
//!
//! This module provides thread-safe, clonable state that is shared across
//! all request handlers. It includes:
//!
//! - **Orchestrator**: Fans each batch out to the configured fetcher
//! - **Rate Limiter**: Optional layer owning the counter reset task
//! - **Configuration**: Runtime configuration access
//!
//! # Structured Concurrency
//!
//! The only background task is the rate limiter's counter reset. Call
//! `shutdown()` to stop it before application exit.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::middleware::{InMemoryCounterStore, RateLimitError, RateLimitLayer, extractor_for};
use crate::services::FetchOrchestrator;

/// Shared application state for Axum handlers.
///
/// This struct is cloned for each request handler. All internal data
/// is wrapped in `Arc` for efficient sharing.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config, fetcher)?;
/// // ... serve ...
/// state.shutdown().await;  // Stop the rate limiter reset task
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Fans URL batches out to the fetcher
    pub orchestrator: FetchOrchestrator,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Application configuration
    pub config: Arc<Config>,
    /// Rate limiting layer, `None` when disabled
    rate_limiter: Option<RateLimitLayer>,
}

impl AppState {
    /// Create application state from configuration and a fetcher.
    ///
    /// # Background Tasks
    ///
    /// When rate limiting is enabled this starts the counter reset task,
    /// so it must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError` if the rate limit configuration is invalid.
    pub fn new(config: Config, fetcher: Arc<dyn Fetcher>) -> Result<Self, RateLimitError> {
        let orchestrator =
            FetchOrchestrator::new(fetcher).with_max_in_flight(config.fetch_concurrency_limit());

        let rate_limiter = if config.rate_limiting_enabled() {
            let layer = RateLimitLayer::new(
                config.rate_limit_requests,
                config.rate_limit_window,
                Arc::new(InMemoryCounterStore::new()),
            )?
            .with_key_extractor(extractor_for(config.client_key_source));
            Some(layer)
        } else {
            None
        };

        Ok(Self {
            orchestrator,
            started_at: Instant::now(),
            config: Arc::new(config),
            rate_limiter,
        })
    }

    /// Rate limiting layer to install on the router, if enabled.
    pub fn rate_limiter(&self) -> Option<&RateLimitLayer> {
        self.rate_limiter.as_ref()
    }

    /// Gracefully stop background tasks.
    ///
    /// Waits for the rate limiter's reset task to exit. Idempotent.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        if let Some(layer) = &self.rate_limiter {
            layer.shutdown().await;
        }

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
