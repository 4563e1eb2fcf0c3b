//! # Response Sizer
//!
//! An HTTP service that takes a batch of URLs, fetches them all
//! concurrently and answers with the byte size of every response body,
//! featuring:
//!
//! - **Concurrent Fan-out**: One task per URL, joined before responding
//! - **Rate Limiting**: Fixed-window counters per client key
//! - **Observability**: Request IDs, structured logging, Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Request ID → Rate Limit → Trace)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (sizes, health)                                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  FetchOrchestrator → ResultCollector                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fetcher (reqwest HttpFetcher)                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use response_sizer::{AppState, Config, HttpFetcher, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);
//!
//!     let state = AppState::new(config, fetcher)?;
//!     let _app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Rate Limiting
//!
//! ```bash
//! RATE_LIMIT_REQUESTS=100 RATE_LIMIT_WINDOW_MS=1000 cargo run
//! ```

pub mod config;
pub mod error;
pub mod fetcher;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::{ClientKeySource, Config};
pub use error::{AppError, AppResult};
pub use fetcher::{FetchError, Fetcher, HttpFetcher};
pub use routes::build_router;
pub use services::{FetchOrchestrator, FetchReport};
pub use state::AppState;
