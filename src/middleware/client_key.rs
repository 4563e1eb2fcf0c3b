//! Client key derivation for the rate limiter.
//!
//! The limiter buckets requests by a *client key*. How that key is derived is
//! a deployment decision, so it sits behind [`ClientKeyExtractor`]:
//!
//! - [`PeerAddrKey`] (default) uses the IP of the TCP peer. Headers are never
//!   consulted, so clients cannot spoof their key, but every client behind
//!   the same proxy or NAT shares one bucket.
//! - [`ForwardedForKey`] uses the first entry of `X-Forwarded-For` and falls
//!   back to the peer address when the header is absent.
//!
//! # Security Warning: IP Spoofing Risk
//!
//! `ForwardedForKey` trusts a client-provided header. Only enable it when the
//! service is reachable exclusively through a proxy that **overwrites** the
//! header:
//!
//! ```nginx
//! proxy_set_header X-Forwarded-For $remote_addr;
//! ```
//!
//! Otherwise a client can rotate spoofed addresses to bypass the limit.
//!
//! # Peer Address Availability
//!
//! The peer address comes from Axum's `ConnectInfo<SocketAddr>` extension,
//! which is only present when the server is started with
//! `into_make_service_with_connect_info::<SocketAddr>()`. Without it every
//! request fails key derivation and is answered with 400.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use thiserror::Error;
use tracing::debug;

use crate::config::ClientKeySource;

/// Header consulted by [`ForwardedForKey`].
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Why no client key could be derived for a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientKeyError {
    /// The request carries no peer address.
    #[error("request has no peer address")]
    MissingPeerAddr,

    /// A header was present but did not hold an IP address.
    #[error("malformed {header} header: '{value}'")]
    Malformed {
        header: &'static str,
        value: String,
    },
}

/// Strategy deriving the rate limiting key from a request.
///
/// Closures of the right shape implement this trait, which keeps one-off
/// strategies short:
///
/// ```rust,ignore
/// let by_tenant = |req: &Request<Body>| {
///     req.headers()
///         .get("x-tenant")
///         .and_then(|v| v.to_str().ok())
///         .map(str::to_owned)
///         .ok_or(ClientKeyError::MissingPeerAddr)
/// };
/// let layer = RateLimitLayer::new(100, window, store)?.with_key_extractor(Arc::new(by_tenant));
/// ```
pub trait ClientKeyExtractor: Send + Sync {
    fn client_key(&self, req: &Request<Body>) -> Result<String, ClientKeyError>;
}

impl<F> ClientKeyExtractor for F
where
    F: Fn(&Request<Body>) -> Result<String, ClientKeyError> + Send + Sync,
{
    fn client_key(&self, req: &Request<Body>) -> Result<String, ClientKeyError> {
        self(req)
    }
}

/// Keys requests by the host portion of the TCP peer address.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerAddrKey;

impl ClientKeyExtractor for PeerAddrKey {
    #[inline]
    fn client_key(&self, req: &Request<Body>) -> Result<String, ClientKeyError> {
        peer_ip(req).map(|ip| ip.to_string())
    }
}

/// Keys requests by the first `X-Forwarded-For` entry.
///
/// Entries may carry a port (`203.0.113.50:8080`); only the IP is kept so
/// that one client maps to one key. Requests without the header fall back
/// to the peer address.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardedForKey;

impl ClientKeyExtractor for ForwardedForKey {
    fn client_key(&self, req: &Request<Body>) -> Result<String, ClientKeyError> {
        let Some(header) = req.headers().get(FORWARDED_FOR_HEADER) else {
            return PeerAddrKey.client_key(req);
        };

        let malformed = |value: &str| ClientKeyError::Malformed {
            header: FORWARDED_FOR_HEADER,
            value: value.to_owned(),
        };

        let value = header
            .to_str()
            .map_err(|_| malformed("<non-ascii>"))?;
        // Format: "client, proxy1, proxy2" - the first entry is the client
        let first = value.split(',').next().unwrap_or_default().trim();

        let ip = first
            .parse::<IpAddr>()
            .or_else(|_| first.parse::<SocketAddr>().map(|addr| addr.ip()))
            .map_err(|_| malformed(first))?;

        debug!(client_ip = %ip, "Client key taken from X-Forwarded-For");
        Ok(ip.to_string())
    }
}

/// Build the extractor for a configured [`ClientKeySource`].
pub fn extractor_for(source: ClientKeySource) -> Arc<dyn ClientKeyExtractor> {
    match source {
        ClientKeySource::Peer => Arc::new(PeerAddrKey),
        ClientKeySource::ForwardedFor => Arc::new(ForwardedForKey),
    }
}

#[inline]
fn peer_ip(req: &Request<Body>) -> Result<IpAddr, ClientKeyError> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .ok_or(ClientKeyError::MissingPeerAddr)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request_from(peer: &str) -> Request<Body> {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        req
    }

    #[test]
    fn test_peer_key_is_host_portion() {
        let req = request_from("127.0.0.1:80");
        assert_eq!(PeerAddrKey.client_key(&req).unwrap(), "127.0.0.1");
    }

    #[test]
    fn test_peer_key_ipv6() {
        let req = request_from("[2001:db8::1]:443");
        assert_eq!(PeerAddrKey.client_key(&req).unwrap(), "2001:db8::1");
    }

    #[test]
    fn test_peer_key_ignores_forwarded_for() {
        let mut req = request_from("10.0.0.7:5000");
        req.headers_mut()
            .insert(FORWARDED_FOR_HEADER, "203.0.113.50".parse().unwrap());

        assert_eq!(PeerAddrKey.client_key(&req).unwrap(), "10.0.0.7");
    }

    #[test]
    fn test_peer_key_missing_connect_info() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(
            PeerAddrKey.client_key(&req),
            Err(ClientKeyError::MissingPeerAddr)
        );
    }

    #[test]
    fn test_forwarded_for_first_entry() {
        let mut req = request_from("10.0.0.1:80");
        req.headers_mut().insert(
            FORWARDED_FOR_HEADER,
            "  192.168.1.1  , 10.0.0.1".parse().unwrap(),
        );

        assert_eq!(ForwardedForKey.client_key(&req).unwrap(), "192.168.1.1");
    }

    #[test]
    fn test_forwarded_for_strips_port() {
        let mut req = request_from("10.0.0.1:80");
        req.headers_mut()
            .insert(FORWARDED_FOR_HEADER, "192.168.1.1:8080".parse().unwrap());

        assert_eq!(ForwardedForKey.client_key(&req).unwrap(), "192.168.1.1");
    }

    #[test]
    fn test_forwarded_for_falls_back_to_peer() {
        let req = request_from("10.0.0.9:1234");
        assert_eq!(ForwardedForKey.client_key(&req).unwrap(), "10.0.0.9");
    }

    #[test]
    fn test_forwarded_for_malformed() {
        let mut req = request_from("10.0.0.1:80");
        req.headers_mut()
            .insert(FORWARDED_FOR_HEADER, "not-an-ip".parse().unwrap());

        assert_eq!(
            ForwardedForKey.client_key(&req),
            Err(ClientKeyError::Malformed {
                header: FORWARDED_FOR_HEADER,
                value: "not-an-ip".to_string(),
            })
        );
    }

    #[test]
    fn test_forwarded_for_empty_header_is_malformed() {
        let mut req = request_from("10.0.0.1:80");
        req.headers_mut()
            .insert(FORWARDED_FOR_HEADER, "".parse().unwrap());

        assert!(matches!(
            ForwardedForKey.client_key(&req),
            Err(ClientKeyError::Malformed { .. })
        ));
    }

    #[test]
    fn test_closure_extractor() {
        let fixed = |_: &Request<Body>| Ok::<_, ClientKeyError>("tenant-a".to_string());
        let req = Request::builder().body(Body::empty()).unwrap();

        assert_eq!(fixed.client_key(&req).unwrap(), "tenant-a");
    }

    #[test]
    fn test_extractor_for_source() {
        let req = request_from("127.0.0.1:9000");

        let peer = extractor_for(ClientKeySource::Peer);
        let forwarded = extractor_for(ClientKeySource::ForwardedFor);

        assert_eq!(peer.client_key(&req).unwrap(), "127.0.0.1");
        assert_eq!(forwarded.client_key(&req).unwrap(), "127.0.0.1");
    }
}
