//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← Sets and echoes X-Request-Id
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 400 on bad client key, 429 if exceeded
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          │
//!          ▼
//!      Handler
//! ```
//!
//! # Routes
//!
//! - `POST /` - Fetch a batch of URLs and report response sizes
//! - `GET /health` - Liveness

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::{propagate_request_id_layer, set_request_id_layer};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// Rate limiting is installed when the state carries a rate limiter, i.e.
/// when `RATE_LIMIT_REQUESTS > 0`. The request body limit is enforced by the
/// size handler itself so that an oversized body is reported like any other
/// body read failure.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let mut router = Router::new()
        .route(
            "/",
            post(handlers::count_sizes).fallback(handlers::method_not_allowed),
        )
        .route("/health", get(handlers::health_check));

    // =========================================================================
    // Apply Middleware Stack (order matters - applied bottom to top)
    // =========================================================================

    // 1. Tracing
    router = router.layer(TraceLayer::new_for_http());

    // 2. Rate Limiting (if enabled)
    match state.rate_limiter() {
        Some(layer) => {
            info!(
                requests = layer.limit(),
                window_ms = layer.window().as_millis(),
                client_key = %config.client_key_source,
                "Rate limiting enabled"
            );
            router = router.layer(layer.clone());
        }
        None => info!("Rate limiting disabled (RATE_LIMIT_REQUESTS=0)"),
    }

    // 3. Request ID, outermost so rejected requests carry one too
    router = router
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer());

    info!(
        max_body_bytes = config.max_request_body_size,
        max_urls = config.fetch_max_urls,
        concurrency = ?config.fetch_concurrency_limit(),
        "Size endpoint configured"
    );

    router.with_state(state)
}
