//! HTTP middleware for security and rate limiting.
//!
//! - **HTTPS Enforcement**: Optional rejection of plain-HTTP requests
//! - **API Key Authentication**: Constant-time comparison, brute-force throttling
//! - **Rate Limiting**: Per-client sliding window
//! - **Client Identity**: Trusted-proxy aware IP extraction shared by the above
//!
//! # Architecture
//!
//! ```text
//! Request → HTTPS → Auth → Rate Limiter → Handler → Response
//!             ↓       ↓         ↓
//!            400   401/403     429
//! ```
//!
//! Request ids, security headers and CORS come from `tower-http` and are
//! wired in [`crate::routes`].

pub mod auth;
pub mod https;
pub mod ip;
pub mod rate_limit;

pub use auth::{ApiKeyAuth, AuthFailureTracker};
pub use https::require_https;
pub use ip::{TrustedProxyConfig, UNKNOWN_IP, client_identity};
pub use rate_limit::{RateLimitDecision, RateLimitError, RateLimitLayer, SlidingWindowLimiter};
