//! Response size endpoint.
//!
//! # Endpoints
//!
//! - `POST /` - Fetch every URL in the body and report each response size
//!
//! Any other method on `/` is answered with 405 and `Allow: POST`.
//!
//! # Configurable Limits
//!
//! - `MAX_REQUEST_BODY_SIZE` - Maximum request body in bytes (default: 1 MiB)
//! - `FETCH_MAX_URLS` - Maximum URLs per batch (default: 1000)
//! - `FETCH_CONCURRENCY` - Maximum in-flight fetches per batch (default: unbounded)

use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{info, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::metrics::record_batch_size;
use crate::state::AppState;
use crate::validation::parse_url_batch;

/// Header carrying the number of URLs whose fetch failed.
pub const FETCH_FAILURES_HEADER: &str = "x-fetch-failures";

/// Fetch every URL of the batch concurrently and return the body sizes.
///
/// # Request Body
///
/// ```text
/// https://test-1.com
/// https://test-2.com/path
/// ```
///
/// # Response Body
///
/// One decimal size per line in completion order, no trailing newline.
/// URLs whose fetch failed contribute no line; their count is reported in
/// the `X-Fetch-Failures` header.
///
/// ```text
/// 25000
/// 1042
/// ```
#[instrument(skip(state, body))]
pub async fn count_sizes(State(state): State<AppState>, body: Body) -> AppResult<Response> {
    let bytes = to_bytes(body, state.config.max_request_body_size)
        .await
        .map_err(|e| AppError::BodyRead(e.to_string()))?;
    let text = String::from_utf8_lossy(&bytes);

    let urls = parse_url_batch(&text, state.config.fetch_max_urls)?;
    record_batch_size(urls.len());

    let requested = urls.len();
    let report = state.orchestrator.run(urls).await;

    if let Some(first) = report.first_error() {
        warn!(
            failed = report.failures.len(),
            requested,
            url = %first.url(),
            error = %first,
            "Some fetches failed"
        );
    } else {
        info!(requested, "Batch fetched");
    }

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")),
            (
                HeaderName::from_static(FETCH_FAILURES_HEADER),
                HeaderValue::from(report.failures.len()),
            ),
        ],
        report.body,
    )
        .into_response())
}

/// Fallback for every method other than POST on `/`.
#[instrument]
pub async fn method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed(method)
}
