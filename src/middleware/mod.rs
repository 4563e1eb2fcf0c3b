//! HTTP middleware for rate limiting and observability.
//!
//! - **Rate Limiting**: Fixed-window counter per client key, reset globally every window
//! - **Client Keys**: Pluggable derivation (peer address by default)
//! - **Request ID**: Generation and propagation for log correlation
//!
//! # Architecture
//!
//! ```text
//! Request → Request ID → Rate Limiter → Trace → Handler → Response
//!                            ↓
//!            400 bad client key / 429 Too Many Requests
//! ```

pub mod client_key;
pub mod counter_store;
pub mod rate_limit;
pub mod request_id;

pub use client_key::{
    ClientKeyError, ClientKeyExtractor, ForwardedForKey, PeerAddrKey, extractor_for,
};
pub use counter_store::{CounterStore, InMemoryCounterStore};
pub use rate_limit::{RateLimitError, RateLimitLayer, RateLimitService};
pub use request_id::{
    REQUEST_ID_HEADER, RequestIdExt, UuidRequestId, propagate_request_id_layer,
    set_request_id_layer,
};
