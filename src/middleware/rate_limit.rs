//! Per-client sliding-window rate limiting.
//!
//! # Algorithm
//!
//! Each client identity owns a log of admission timestamps. On every check:
//!
//! 1. Timestamps at least `window` old are dropped from the front of the log
//! 2. If `max_requests` timestamps remain, the request is rejected with a
//!    retry hint equal to the window length
//! 3. Otherwise `now` is appended and the request is admitted
//!
//! The window slides with every check; there are no fixed reset boundaries.
//!
//! # Concurrency
//!
//! Logs live in a [`DashMap`]. The purge-count-append sequence runs while the
//! identity's entry guard is held, so two simultaneous requests competing for
//! the last slot cannot both be admitted. Different identities on different
//! shards proceed in parallel.
//!
//! # Memory
//!
//! Pruning on access never removes an identity's key. [`SlidingWindowLimiter::evict_idle`]
//! removes identities whose logs are empty; `AppState` runs it periodically.
//!
//! # Response Headers
//!
//! - `X-RateLimit-Limit`: configured requests per window
//! - `X-RateLimit-Remaining`: slots left after this request
//! - `Retry-After`: window length in seconds (429 only)

use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderValue, Request, Response};
use axum::response::IntoResponse;
use dashmap::DashMap;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::ip::{TrustedProxyConfig, client_identity};
use crate::error::AppError;
use crate::metrics;

/// Header carrying the configured quota.
pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";

/// Header carrying the slots left in the current window.
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Error type for rate limit layer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// Window length cannot be zero.
    ZeroWindow,
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::ZeroWindow => write!(f, "rate limit window must be greater than 0"),
        }
    }
}

impl std::error::Error for RateLimitError {}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Request admitted and recorded.
    Admit {
        /// Slots left in the window after this request.
        remaining: u32,
    },
    /// Quota exhausted; nothing was recorded.
    Reject {
        /// Suggested wait before retrying (always the window length).
        retry_after: Duration,
    },
}

impl RateLimitDecision {
    /// Whether the request was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, RateLimitDecision::Admit { .. })
    }
}

/// Concurrency-safe sliding-window request log keyed by client identity.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_requests: NonZeroU32,
    window: Duration,
    logs: DashMap<String, VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter admitting `max_requests` per `window` per identity.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::ZeroWindow` if `window` is zero.
    pub fn new(max_requests: NonZeroU32, window: Duration) -> Result<Self, RateLimitError> {
        if window.is_zero() {
            return Err(RateLimitError::ZeroWindow);
        }

        Ok(Self {
            max_requests,
            window,
            logs: DashMap::new(),
        })
    }

    /// Configured quota per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests.get()
    }

    /// Configured window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check `identity` against its quota at time `now` and record the request if admitted.
    ///
    /// A timestamp exactly `window` old is outside the window.
    pub fn check_and_record(&self, identity: &str, now: Instant) -> RateLimitDecision {
        let max = self.max_requests.get() as usize;

        // The entry guard holds the shard lock for the whole sequence
        let mut log = match self.logs.get_mut(identity) {
            Some(log) => log,
            None => self.logs.entry(identity.to_string()).or_default(),
        };

        purge_expired(&mut log, now, self.window);

        if log.len() >= max {
            return RateLimitDecision::Reject {
                retry_after: self.window,
            };
        }

        log.push_back(now);

        RateLimitDecision::Admit {
            remaining: u32::try_from(max - log.len()).unwrap_or(u32::MAX),
        }
    }

    /// Drop identities with no request inside the window at `now`.
    ///
    /// Returns how many identities were removed.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let before = self.logs.len();
        self.logs.retain(|_, log| {
            purge_expired(log, now, self.window);
            !log.is_empty()
        });
        before.saturating_sub(self.logs.len())
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.logs.len()
    }
}

/// Remove timestamps that have aged out of the window.
fn purge_expired(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while log
        .front()
        .is_some_and(|t| now.saturating_duration_since(*t) >= window)
    {
        log.pop_front();
    }
}

// =============================================================================
// Tower Layer
// =============================================================================

/// Rate limiting layer for the Tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = Arc::new(SlidingWindowLimiter::new(quota, Duration::from_secs(60))?);
/// let app = Router::new()
///     .route("/api", post(handler))
///     .layer(RateLimitLayer::new(limiter, &[]));
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<SlidingWindowLimiter>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl RateLimitLayer {
    /// Wrap a shared limiter, resolving identities through `trusted_proxies`.
    pub fn new(limiter: Arc<SlidingWindowLimiter>, trusted_proxies: &[String]) -> Self {
        Self {
            limiter,
            trusted_proxies: Arc::new(TrustedProxyConfig::new(trusted_proxies)),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<SlidingWindowLimiter>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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
        let limit = self.limiter.max_requests();
        let identity = client_identity(&req, &self.trusted_proxies);
        let decision = self.limiter.check_and_record(&identity, Instant::now());

        // Take the readied service, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match decision {
                RateLimitDecision::Admit { remaining } => {
                    debug!(client = %identity, remaining, "Request admitted by rate limiter");
                    let mut response = inner.call(req).await?;
                    let headers = response.headers_mut();
                    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(limit));
                    headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(remaining));
                    Ok(response)
                }
                RateLimitDecision::Reject { retry_after } => {
                    let retry_after = retry_after.as_secs().max(1);

                    warn!(
                        client = %identity,
                        path = %req.uri().path(),
                        retry_after_secs = retry_after,
                        "Rate limit exceeded"
                    );
                    metrics::record_rate_limited();

                    let mut response = AppError::RateLimited { retry_after }.into_response();
                    let headers = response.headers_mut();
                    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(limit));
                    headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(0u32));
                    Ok(response)
                }
            }
        })
    }
}
