//! API key authentication middleware.
//!
//! # Security Features
//!
//! - **Constant-time comparison**: Prevents timing attacks on API key validation
//! - **Configurable header**: `API_KEY_NAME` selects the header (default `X-API-Key`)
//! - **Selective protection**: Info and health endpoints bypassed for monitoring
//! - **Brute-force throttling**: Repeated failures from one client are answered with 429
//!
//! # Usage
//!
//! Set the `API_KEY` environment variable to enable authentication:
//!
//! ```bash
//! API_KEY=your-secret-key cargo run
//! ```
//!
//! Clients must then send the key in the configured header:
//!
//! ```bash
//! curl -H "X-API-Key: your-secret-key" \
//!      -H "Content-Type: application/json" \
//!      -d '{"to_number":"+14155552671"}' \
//!      http://localhost:8000/api/v1/messages/hello-world
//! ```
//!
//! # Responses
//!
//! - Header absent (or empty): 401 with `WWW-Authenticate: API-Key`
//! - Header present but wrong: 403
//!
//! # Path Matching
//!
//! Bypass paths use exact string matching against `request.uri().path()`:
//! `/health` is bypassed, `/health/` and `/HEALTH` are not.
//!
//! # Failure State
//!
//! Failure budgets and blocks live in an [`AuthFailureTracker`] shared with
//! `AppState`, whose periodic sweep calls [`AuthFailureTracker::evict_expired`].

use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderName, Request, Response};
use axum::response::IntoResponse;
use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};
use tracing::{debug, error, warn};

use super::ip::{TrustedProxyConfig, client_identity};
use crate::error::AppError;
use crate::metrics;

/// Maximum auth failures per client per minute before blocking.
const DEFAULT_AUTH_FAILURE_LIMIT: NonZeroU32 = NonZeroU32::new(10).unwrap();

/// Burst capacity for auth failure throttling.
const DEFAULT_AUTH_FAILURE_BURST: NonZeroU32 = NonZeroU32::new(5).unwrap();

/// Per-client auth failure limiter.
type AuthFailureLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Per-client auth failure budgets and the blocks they produce.
///
/// Each failed attempt consumes a token from a per-client `governor` bucket.
/// Once the bucket is empty the client is blocked until the bucket refills.
pub struct AuthFailureTracker {
    limiter: AuthFailureLimiter,
    /// Clients whose failure budget ran out, with the instant the block lifts
    blocked: DashMap<String, Instant>,
}

impl AuthFailureTracker {
    /// Tracker allowing 10 failures per minute per client, burst 5.
    pub fn new() -> Self {
        Self::with_quota(
            Quota::per_minute(DEFAULT_AUTH_FAILURE_LIMIT).allow_burst(DEFAULT_AUTH_FAILURE_BURST),
        )
    }

    pub(crate) fn with_quota(quota: Quota) -> Self {
        Self {
            limiter: RateLimiter::keyed(quota),
            blocked: DashMap::new(),
        }
    }

    /// Seconds left on `client`'s block, if it is blocked at `now`.
    fn blocked_for(&self, client: &str, now: Instant) -> Option<u64> {
        let until = *self.blocked.get(client)?;
        if until <= now {
            self.blocked.remove_if(client, |_, until| *until <= now);
            return None;
        }
        Some(until.duration_since(now).as_secs().max(1))
    }

    /// Spend one unit of `client`'s failure budget, blocking it once the budget is gone.
    pub(crate) fn record_failure(&self, client: String) {
        if let Err(not_until) = self.limiter.check_key(&client) {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            error!(
                client = %client,
                retry_after_secs = wait.as_secs().max(1),
                "Client blocked due to excessive auth failures"
            );
            self.blocked.insert(client, Instant::now() + wait);
        }
    }

    /// Drop blocks that have lifted by `now` and budgets that have fully refilled.
    ///
    /// Returns how many blocks were removed.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let before = self.blocked.len();
        self.blocked.retain(|_, until| *until > now);
        self.blocked.shrink_to_fit();

        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();

        before.saturating_sub(self.blocked.len())
    }

    /// Clients with a partly spent failure budget.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Clients currently blocked (including blocks not yet swept).
    pub fn blocked_clients(&self) -> usize {
        self.blocked.len()
    }
}

impl Default for AuthFailureTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// API key authentication layer.
///
/// When the expected key is `None`, all requests are allowed (auth disabled).
///
/// # Brute Force Protection
///
/// Failures are recorded in the shared [`AuthFailureTracker`]. A blocked
/// client gets 429 before the key is even looked at, so guessing stops
/// yielding answers. Successful requests never touch the budget.
#[derive(Clone)]
pub struct ApiKeyAuth {
    /// Expected API key (None = auth disabled)
    expected_key: Option<Arc<String>>,
    /// Header the key is read from
    header: HeaderName,
    /// Paths that bypass authentication
    bypass_paths: Arc<Vec<String>>,
    failures: Arc<AuthFailureTracker>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl ApiKeyAuth {
    /// Create a new API key auth layer.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Expected API key, or `None` to disable authentication
    /// * `header` - Header carrying the key
    /// * `bypass_paths` - Paths served without a key
    /// * `trusted_proxies` - CIDRs whose forwarding headers identify the client
    /// * `failures` - Failure state, shared with the sweep that prunes it
    pub fn new(
        api_key: Option<String>,
        header: HeaderName,
        bypass_paths: Vec<String>,
        trusted_proxies: &[String],
        failures: Arc<AuthFailureTracker>,
    ) -> Self {
        Self {
            expected_key: api_key.map(Arc::new),
            header,
            bypass_paths: Arc::new(bypass_paths),
            failures,
            trusted_proxies: Arc::new(TrustedProxyConfig::new(trusted_proxies)),
        }
    }

    /// Check if authentication is enabled.
    pub fn is_enabled(&self) -> bool {
        self.expected_key.is_some()
    }
}

impl<S> Layer<S> for ApiKeyAuth {
    type Service = ApiKeyAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyAuthService {
            inner,
            auth: self.clone(),
        }
    }
}

/// API key authentication service wrapper.
#[derive(Clone)]
pub struct ApiKeyAuthService<S> {
    inner: S,
    auth: ApiKeyAuth,
}

impl<S> Service<Request<Body>> for ApiKeyAuthService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let auth = self.auth.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let Some(expected) = auth.expected_key.as_deref() else {
                return inner.call(req).await;
            };

            let path = req.uri().path();
            if auth.bypass_paths.iter().any(|p| p == path) {
                debug!(path, "Bypassing auth for public endpoint");
                return inner.call(req).await;
            }

            let client = client_identity(&req, &auth.trusted_proxies).into_owned();

            if let Some(retry_after) = auth.failures.blocked_for(&client, Instant::now()) {
                warn!(
                    client = %client,
                    retry_after_secs = retry_after,
                    "Rejecting request from client blocked for auth failures"
                );
                return Ok(AppError::RateLimited { retry_after }.into_response());
            }

            let failure = match extract_api_key(&req, &auth.header) {
                Some(provided) if constant_time_eq(provided, expected) => None,
                Some(_) => Some(AppError::AuthInvalid),
                None => Some(AppError::AuthMissing),
            };

            let Some(err) = failure else {
                debug!(client = %client, "API key authentication successful");
                return inner.call(req).await;
            };

            warn!(
                path = %req.uri().path(),
                client = %client,
                reason = %err,
                "API key authentication failed"
            );
            metrics::record_auth_failure(matches!(err, AppError::AuthMissing));
            auth.failures.record_failure(client);

            Ok(err.into_response())
        })
    }
}

/// Read the API key from `header`, treating an empty value as absent.
fn extract_api_key<'a, B>(req: &'a Request<B>, header: &HeaderName) -> Option<&'a str> {
    req.headers()
        .get(header)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// Constant-time string comparison.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
