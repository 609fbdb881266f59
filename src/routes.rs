//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← Sets / propagates X-Request-Id
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Security Headers │ ← nosniff, DENY, HSTS, CSP on every response
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response spans
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Preflights answered before auth
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  HTTPS Required  │ ← 400 if REQUIRE_HTTPS and scheme is not https
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Authentication  │ ← 401 missing / 403 invalid (bypassed for /, /health)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 once the client's window is full
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Body Limit     │ ← 413 over MAX_REQUEST_BODY_SIZE
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/`, `/health` - Info and health (auth bypassed)
//! - `/api/v1/messages/...` - Message sending

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Request, header};
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn};

use crate::error::{AppError, AppResult};
use crate::handlers;
use crate::middleware::rate_limit::{RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER};
use crate::middleware::{ApiKeyAuth, RateLimitLayer, TrustedProxyConfig, require_https};
use crate::models::{
    AccountCreatedRequest, HelloWorldRequest, OrderConfirmRequest, TemplateMessageRequest,
};
use crate::state::AppState;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Security headers added to every response.
const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    (
        "strict-transport-security",
        "max-age=31536000; includeSubDomains",
    ),
    ("content-security-policy", "default-src 'self'"),
];

/// Build the application router with all routes and middleware configured.
///
/// # Middleware Configuration
///
/// - **Rate Limiting**: Enabled if `state.limiter` is set (`RATE_LIMIT_MAX_REQUESTS > 0`)
/// - **Authentication**: Enabled if `api_key` is set
/// - **HTTPS**: Enforced if `require_https` is set
/// - **CORS**: Configured from `cors_allowed_origins`
///
/// # Errors
///
/// Returns `AppError::ConfigError` if the API key header name is invalid.
pub fn build_router(state: AppState) -> AppResult<Router> {
    let config = state.config.clone();

    let mut router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route(
            "/api/v1/messages/",
            post(handlers::send_template::<TemplateMessageRequest>),
        )
        .route(
            "/api/v1/messages",
            post(handlers::send_template::<TemplateMessageRequest>),
        )
        .route("/api/v1/messages/text", post(handlers::send_text))
        .route(
            "/api/v1/messages/hello-world",
            post(handlers::send_template::<HelloWorldRequest>),
        )
        .route(
            "/api/v1/messages/order-confirm",
            post(handlers::send_template::<OrderConfirmRequest>),
        )
        .route(
            "/api/v1/messages/account-created",
            post(handlers::send_template::<AccountCreatedRequest>),
        );

    // =========================================================================
    // Middleware, innermost first (the last layer added runs first)
    // =========================================================================

    // 1. Request body size limit
    info!(
        max_size_bytes = config.max_request_body_size,
        "Request body size limit configured"
    );
    router = router.layer(DefaultBodyLimit::max(config.max_request_body_size));

    // 2. Rate limiting (if enabled)
    match &state.limiter {
        Some(limiter) => {
            info!(
                max_requests = limiter.max_requests(),
                window_secs = limiter.window().as_secs(),
                trusted_proxies = config.trusted_proxies.len(),
                "Rate limiting enabled"
            );
            router = router.layer(RateLimitLayer::new(
                limiter.clone(),
                &config.trusted_proxies,
            ));
        }
        None => info!("Rate limiting disabled (RATE_LIMIT_MAX_REQUESTS=0)"),
    }

    // 3. Authentication (if enabled)
    let auth_header = HeaderName::from_bytes(config.api_key_header.as_bytes()).map_err(|e| {
        AppError::ConfigError(format!(
            "Invalid API key header '{}': {e}",
            config.api_key_header
        ))
    })?;
    let auth_layer = ApiKeyAuth::new(
        config.api_key.clone(),
        auth_header,
        config.auth_bypass_paths.clone(),
        &config.trusted_proxies,
        state.auth_failures.clone(),
    );
    if auth_layer.is_enabled() {
        info!(
            header = %config.api_key_header,
            bypass_paths = ?config.auth_bypass_paths,
            "API key authentication enabled"
        );
        router = router.layer(auth_layer);
    } else {
        warn!("API key authentication disabled (no API_KEY set)");
    }

    // 4. HTTPS enforcement (if enabled)
    if config.require_https {
        info!("HTTPS enforcement enabled");
        let trusted = Arc::new(TrustedProxyConfig::new(&config.trusted_proxies));
        router = router.layer(axum::middleware::from_fn_with_state(trusted, require_https));
    }

    // 5. CORS
    router = router.layer(build_cors_layer(&config.cors_allowed_origins));

    // 6. Tracing, with the request id on every span
    router = router.layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        info_span!(
            "http_request",
            method = %req.method(),
            uri = %req.uri(),
            request_id = %request_id,
        )
    }));

    // 7. Security headers
    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    // 8. Request ID: generated first, copied onto the response last
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    router = router
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid));

    Ok(router.with_state(state))
}

/// Build CORS layer from configuration.
///
/// # Security Note
///
/// `*` (any origin) is convenient for development but should be avoided in
/// production. Specify explicit origins instead. Invalid origins are skipped.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let exposed = [
        HeaderName::from_static(REQUEST_ID_HEADER),
        HeaderName::from_static(RATE_LIMIT_LIMIT_HEADER),
        HeaderName::from_static(RATE_LIMIT_REMAINING_HEADER),
        header::RETRY_AFTER,
    ];

    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(exposed);

    if allowed_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(origin) => Some(origin),
            Err(_) => {
                warn!(origin = %o, "Invalid CORS origin, skipping");
                None
            }
        })
        .collect();

    cors.allow_origin(origins)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_router_serves_root_with_security_headers() {
        let state = AppState::new(Config::default()).unwrap();
        let app = build_router(state.clone()).unwrap();

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "active");
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let state = AppState::new(Config::default()).unwrap();
        let app = build_router(state.clone()).unwrap();

        let response = app
            .oneshot(Request::get("/api/v2/nothing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        state.shutdown().await;
    }

    #[test]
    fn test_build_cors_layer_any() {
        let _layer = build_cors_layer(&["*".to_string()]);
    }

    #[test]
    fn test_build_cors_layer_specific() {
        let origins = vec![
            "https://example.com".to_string(),
            "https://app.example.com".to_string(),
            "bad\norigin".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }

    #[tokio::test]
    async fn test_build_router_rejects_bad_header_name() {
        let config = Config {
            api_key_header: "bad header".to_string(),
            ..Config::default()
        };
        let state = AppState::new(config).unwrap();

        let result = build_router(state.clone());
        assert!(matches!(result, Err(AppError::ConfigError(_))));
        state.shutdown().await;
    }
}
