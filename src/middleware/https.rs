//! HTTPS enforcement for deployments behind a TLS-terminating proxy.
//!
//! The service itself speaks plain HTTP. When `REQUIRE_HTTPS=true` the
//! original scheme is taken from `X-Forwarded-Proto` (first value), falling
//! back to the request URI scheme. Anything other than `https` gets 400.
//!
//! `X-Forwarded-Proto` is only read when the TCP peer is inside a
//! `TRUSTED_PROXIES` range, so enabling this without a configured proxy
//! rejects everything.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::ip::{TrustedProxyConfig, peer_ip};
use crate::error::AppError;

/// Header set by the edge proxy with the client-facing scheme.
pub const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

/// Scheme the client used, as far as the request can tell.
fn request_scheme<B>(req: &Request<B>, trusted: &TrustedProxyConfig) -> Option<String> {
    if let Some(value) = req.headers().get(FORWARDED_PROTO_HEADER) {
        let peer = peer_ip(req);
        if trusted.is_trusted(peer) {
            if let Ok(value) = value.to_str()
                && let Some(first) = value.split(',').next()
            {
                return Some(first.trim().to_ascii_lowercase());
            }
        } else {
            debug!(peer = ?peer, "Ignoring X-Forwarded-Proto from untrusted peer");
        }
    }

    req.uri().scheme_str().map(str::to_ascii_lowercase)
}

/// Whether the request arrived over HTTPS.
pub fn is_https<B>(req: &Request<B>, trusted: &TrustedProxyConfig) -> bool {
    request_scheme(req, trusted).as_deref() == Some("https")
}

/// `axum::middleware::from_fn_with_state` handler rejecting plain-HTTP requests.
pub async fn require_https(
    State(trusted): State<Arc<TrustedProxyConfig>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if is_https(&req, &trusted) {
        return next.run(req).await;
    }

    warn!(
        path = %req.uri().path(),
        scheme = ?request_scheme(&req, &trusted),
        "Rejecting non-HTTPS request"
    );
    AppError::HttpsRequired.into_response()
}
