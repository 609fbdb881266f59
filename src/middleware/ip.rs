//! Client identity extraction for rate limiting and auth failure tracking.
//!
//! The identity is the caller's IP address as a string. Resolution order:
//!
//! 1. `X-Forwarded-For` (first entry), then `X-Real-IP` - only when the TCP
//!    peer is inside a `TRUSTED_PROXIES` range
//! 2. The TCP peer address from `ConnectInfo<SocketAddr>`
//! 3. [`UNKNOWN_IP`]
//!
//! # Running Behind a Proxy
//!
//! With an empty `TRUSTED_PROXIES` list, forwarding headers are ignored and
//! every client is keyed on its TCP peer. Behind a reverse proxy that would
//! put all callers in one bucket, so list the proxy's address and make sure it
//! overwrites the headers:
//!
//! ```nginx
//! proxy_set_header X-Real-IP $remote_addr;
//! proxy_set_header X-Forwarded-For $remote_addr;
//! ```
//!
//! ## The "unknown" Fallback
//!
//! Requests with no headers and no connection info share the `"unknown"`
//! key and are therefore rate limited collectively.

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::{debug, warn};

/// Fallback identity when no client IP can be determined.
pub const UNKNOWN_IP: &str = "unknown";

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse `"10.0.0.0/8"`, `"::1/128"` or a bare address (implicit /32 or /128).
    ///
    /// Returns `None` if the format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();
        let (addr, prefix) = match cidr.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (cidr, None),
        };

        let network: IpAddr = addr.parse().ok()?;
        let max_prefix = if network.is_ipv4() { 32 } else { 128 };

        let prefix_len = match prefix {
            Some(p) => p.parse::<u8>().ok().filter(|p| *p <= max_prefix)?,
            None => max_prefix,
        };

        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Check if an address falls inside this range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

/// Set of reverse proxies whose forwarding headers are believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Build from CIDR strings. Invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        Self { ranges }
    }

    /// Whether any ranges are configured.
    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Whether forwarding headers from `peer` may be believed.
    ///
    /// Nothing is trusted when no ranges are configured, nor is an unknown peer.
    pub fn is_trusted(&self, peer: Option<IpAddr>) -> bool {
        peer.is_some_and(|ip| self.ranges.iter().any(|range| range.contains(&ip)))
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// IP found in forwarding headers, borrowed from the request.
fn forwarded_ip<B>(req: &Request<B>) -> Option<&str> {
    // "client, proxy1, proxy2" - the first entry is the client
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first_ip) = value.split(',').next()
    {
        return Some(first_ip.trim());
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
    {
        return Some(value.trim());
    }

    None
}

/// TCP peer address, present when served with `into_make_service_with_connect_info`.
pub fn peer_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Resolve the client identity of a request.
///
/// Returns `Cow::Borrowed(UNKNOWN_IP)` when nothing identifies the caller.
pub fn client_identity<B>(req: &Request<B>, trusted: &TrustedProxyConfig) -> Cow<'static, str> {
    let peer = peer_ip(req);

    if let Some(ip) = forwarded_ip(req).filter(|ip| !ip.is_empty()) {
        if trusted.is_trusted(peer) {
            return Cow::Owned(ip.to_string());
        }
        debug!(
            forwarded = %ip,
            peer = ?peer,
            "Ignoring forwarding header from untrusted peer"
        );
    }

    match peer {
        Some(ip) => Cow::Owned(ip.to_string()),
        None => Cow::Borrowed(UNKNOWN_IP),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn with_peer(mut req: Request<Body>, peer: &str) -> Request<Body> {
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    fn loopback_proxy() -> TrustedProxyConfig {
        TrustedProxyConfig::new(&["127.0.0.1".to_string()])
    }

    #[test]
    fn test_identity_from_xff_first_hop() {
        let req = Request::builder()
            .header("x-forwarded-for", "  192.168.1.1  , 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        let req = with_peer(req, "127.0.0.1:40000");

        assert_eq!(client_identity(&req, &loopback_proxy()), "192.168.1.1");
    }

    #[test]
    fn test_identity_from_real_ip() {
        let req = Request::builder()
            .header("x-real-ip", "2001:db8::1")
            .body(Body::empty())
            .unwrap();
        let req = with_peer(req, "127.0.0.1:40000");

        assert_eq!(client_identity(&req, &loopback_proxy()), "2001:db8::1");
    }

    #[test]
    fn test_forwarding_headers_ignored_without_trusted_proxies() {
        let req = Request::builder()
            .header("x-forwarded-for", "10.0.0.1")
            .header("x-real-ip", "10.0.0.2")
            .body(Body::empty())
            .unwrap();
        let req = with_peer(req, "203.0.113.7:5555");

        assert_eq!(
            client_identity(&req, &TrustedProxyConfig::default()),
            "203.0.113.7"
        );
    }

    #[test]
    fn test_forwarding_headers_without_peer_are_unknown() {
        let req = Request::builder()
            .header("x-forwarded-for", "10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_identity(&req, &TrustedProxyConfig::default()), UNKNOWN_IP);
    }

    #[test]
    fn test_identity_from_peer() {
        let req = with_peer(Request::builder().body(Body::empty()).unwrap(), "203.0.113.7:5555");

        let trusted = TrustedProxyConfig::default();
        assert_eq!(client_identity(&req, &trusted), "203.0.113.7");
    }

    #[test]
    fn test_identity_unknown_is_borrowed() {
        let req = Request::builder().body(Body::empty()).unwrap();

        let ip = client_identity(&req, &TrustedProxyConfig::default());
        assert_eq!(ip, UNKNOWN_IP);
        assert!(matches!(ip, Cow::Borrowed(_)));
    }

    #[test]
    fn test_empty_xff_falls_back_to_peer() {
        let trusted = TrustedProxyConfig::new(&["198.51.100.0/24".to_string()]);
        let req = Request::builder()
            .header("x-forwarded-for", "   ")
            .body(Body::empty())
            .unwrap();
        let req = with_peer(req, "198.51.100.2:1234");

        assert_eq!(client_identity(&req, &trusted), "198.51.100.2");
    }

    #[test]
    fn test_untrusted_peer_headers_ignored() {
        let trusted = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);

        let req = Request::builder()
            .header("x-forwarded-for", "1.2.3.4")
            .body(Body::empty())
            .unwrap();
        let req = with_peer(req, "198.51.100.2:1234");

        assert_eq!(client_identity(&req, &trusted), "198.51.100.2");
    }

    #[test]
    fn test_trusted_peer_headers_used() {
        let trusted = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);

        let req = Request::builder()
            .header("x-forwarded-for", "1.2.3.4")
            .body(Body::empty())
            .unwrap();
        let req = with_peer(req, "10.1.2.3:443");

        assert_eq!(client_identity(&req, &trusted), "1.2.3.4");
    }

    #[test]
    fn test_cidr_parse() {
        assert_eq!(CidrRange::parse("10.0.0.0/8").unwrap().prefix_len, 8);
        assert_eq!(CidrRange::parse("::1/128").unwrap().prefix_len, 128);
        assert_eq!(CidrRange::parse("192.168.1.1").unwrap().prefix_len, 32);
        assert!(CidrRange::parse("not-an-ip").is_none());
        assert!(CidrRange::parse("10.0.0.0/33").is_none());
    }

    #[test]
    fn test_cidr_contains() {
        let cidr = CidrRange::parse("192.168.1.0/24").unwrap();
        assert!(cidr.contains(&"192.168.1.254".parse().unwrap()));
        assert!(!cidr.contains(&"192.168.2.1".parse().unwrap()));
        assert!(!cidr.contains(&"::1".parse().unwrap()));

        let all = CidrRange::parse("0.0.0.0/0").unwrap();
        assert!(all.contains(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_trusted_proxy_config() {
        let empty = TrustedProxyConfig::new(&[]);
        assert!(!empty.is_enabled());
        assert!(!empty.is_trusted(None));
        assert!(!empty.is_trusted(Some("127.0.0.1".parse().unwrap())));

        let config = TrustedProxyConfig::new(&["172.16.0.0/12".to_string(), "bogus".to_string()]);
        assert!(config.is_enabled());
        assert!(config.is_trusted(Some("172.31.255.255".parse().unwrap())));
        assert!(!config.is_trusted(Some("8.8.8.8".parse().unwrap())));
        assert!(!config.is_trusted(None));
    }
}
