//! Router-level tests with a scripted fetcher.
//!
//! Requests are driven through the full middleware stack with
//! `tower::ServiceExt::oneshot`; no sockets are opened. The peer address the
//! server would normally supply is injected as a `ConnectInfo` extension.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{Method, Request, Response, StatusCode};
use tower::ServiceExt;
use url::Url;

use response_sizer::fetcher::FetchFuture;
use response_sizer::{AppState, ClientKeySource, Config, FetchError, Fetcher, build_router};

/// Answers `https://<host>/<len>` with `len` bytes, panics on `/panic` and
/// fails any other path.
#[derive(Default)]
struct ScriptedFetcher {
    calls: AtomicUsize,
}

impl Fetcher for ScriptedFetcher {
    fn fetch<'a>(&'a self, url: &'a Url) -> FetchFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;

            let path = url.path().trim_start_matches('/');
            if path == "panic" {
                panic!("fetcher blew up on {url}");
            }

            match path.parse::<usize>() {
                Ok(len) => Ok(Bytes::from(vec![b'x'; len])),
                Err(_) => Err(FetchError::Other {
                    url: url.to_string(),
                    reason: "no such resource".to_string(),
                }),
            }
        })
    }
}

fn test_config() -> Config {
    Config {
        rate_limit_window: Duration::from_secs(60),
        ..Config::default()
    }
}

fn app(config: Config) -> (Router, AppState, Arc<ScriptedFetcher>) {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let state = AppState::new(config, fetcher.clone()).unwrap();
    (build_router(state.clone()), state, fetcher)
}

fn request(method: Method, path: &str, body: &str, peer: Option<&str>) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::from(body.to_string()))
        .unwrap();
    if let Some(peer) = peer {
        req.extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
    }
    req
}

fn post(body: &str) -> Request<Body> {
    request(Method::POST, "/", body, Some("10.0.0.1:5000"))
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

// ============================================================================
// Size Endpoint
// ============================================================================

#[tokio::test]
async fn test_batch_sizes() {
    let (router, _, fetcher) = app(test_config());

    let response = router
        .oneshot(post("https://a.test/25000\nhttps://b.test/25000\nhttps://c.test/25000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-fetch-failures"], "0");
    assert_eq!(body_text(response).await, "25000\n25000\n25000");
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failed_fetches_are_counted() {
    let (router, _, _) = app(test_config());

    let response = router
        .oneshot(post("https://a.test/12\nhttps://a.test/gone\nhttps://a.test/nope"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-fetch-failures"], "2");
    assert_eq!(body_text(response).await, "12");
}

#[tokio::test]
async fn test_panicking_fetch_is_counted_as_failure() {
    let (router, _, _) = app(test_config());

    let response = router
        .oneshot(post("https://a.test/40\nhttps://a.test/panic"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-fetch-failures"], "1");
    assert_eq!(body_text(response).await, "40");
}

#[tokio::test]
async fn test_invalid_line_fetches_nothing() {
    let (router, _, fetcher) = app(test_config());

    let response = router
        .oneshot(post("https://a.test/10\ntest-1.xyz"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "invalid_url");
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_batch_over_url_limit_is_bad_request() {
    let (router, _, fetcher) = app(Config {
        fetch_max_urls: 2,
        ..test_config()
    });

    let response = router
        .oneshot(post("https://a.test/1\nhttps://a.test/2\nhttps://a.test/3"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_body_over_size_limit_is_read_error() {
    let (router, _, _) = app(Config {
        max_request_body_size: 16,
        ..test_config()
    });

    let response = router
        .oneshot(post("https://a.test/25000\nhttps://b.test/25000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "body_read_error");
}

#[tokio::test]
async fn test_other_methods_are_rejected() {
    let (router, _, fetcher) = app(test_config());

    for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH] {
        let response = router
            .clone()
            .oneshot(request(
                method,
                "/",
                "https://a.test/10",
                Some("10.0.0.1:5000"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()["allow"], "POST");
    }
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let (router, _, _) = app(test_config());

    let response = router
        .oneshot(request(Method::POST, "/sizes", "", Some("10.0.0.1:5000")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Rate Limiting
// ============================================================================

#[tokio::test]
async fn test_missing_peer_address_is_bad_request() {
    let (router, _, fetcher) = app(test_config());

    let response = router
        .oneshot(request(Method::POST, "/", "https://a.test/1", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad_request");
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_limit_is_per_peer() {
    let (router, state, _) = app(Config {
        rate_limit_requests: 1,
        ..test_config()
    });

    let first = router.clone().oneshot(post("")).await.unwrap();
    let second = router.clone().oneshot(post("")).await.unwrap();
    let other_peer = router
        .oneshot(request(Method::POST, "/", "", Some("10.0.0.2:5000")))
        .await
        .unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(other_peer.status(), StatusCode::OK);

    state.shutdown().await;
}

#[tokio::test]
async fn test_forwarded_for_keys_by_header() {
    let (router, _, _) = app(Config {
        rate_limit_requests: 1,
        client_key_source: ClientKeySource::ForwardedFor,
        ..test_config()
    });

    let from_client = |client: &str| {
        let mut req = post("");
        req.headers_mut()
            .insert("x-forwarded-for", client.parse().unwrap());
        req
    };

    // Same proxy peer, different forwarded clients
    let a = router
        .clone()
        .oneshot(from_client("203.0.113.7, 10.0.0.1"))
        .await
        .unwrap();
    let b = router
        .clone()
        .oneshot(from_client("203.0.113.8"))
        .await
        .unwrap();
    let a_again = router
        .clone()
        .oneshot(from_client("203.0.113.7"))
        .await
        .unwrap();
    let malformed = router.oneshot(from_client("not-an-ip")).await.unwrap();

    assert_eq!(a.status(), StatusCode::OK);
    assert_eq!(b.status(), StatusCode::OK);
    assert_eq!(a_again.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(start_paused = true)]
async fn test_counters_reset_every_window() {
    let (router, _, _) = app(Config {
        rate_limit_requests: 1,
        rate_limit_window: Duration::from_millis(1000),
        ..test_config()
    });

    assert_eq!(
        router.clone().oneshot(post("")).await.unwrap().status(),
        StatusCode::OK
    );
    assert_eq!(
        router.clone().oneshot(post("")).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(
        router.oneshot(post("")).await.unwrap().status(),
        StatusCode::OK
    );
}
