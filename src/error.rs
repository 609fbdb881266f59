use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::provider::DeliveryError;

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Provider Errors
///
/// Failures reported by the WhatsApp API are split by origin so callers can
/// tell their own mistakes from provider outages:
///
/// - `ProviderRejected` - provider answered 4xx (bad template, bad recipient)
/// - `ProviderServerError` - provider answered 5xx
/// - `ProviderUnavailable` - the provider could not be reached at all
#[derive(Error, Debug)]
pub enum AppError {
    #[error("API key header is missing")]
    AuthMissing,

    #[error("Invalid API key")]
    AuthInvalid,

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("HTTPS is required")]
    HttpsRequired,

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("Provider rejected the message ({status}): {detail}")]
    ProviderRejected { status: u16, detail: String },

    #[error("Provider server error ({status}): {detail}")]
    ProviderServerError { status: u16, detail: String },

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl AppError {
    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthMissing => StatusCode::UNAUTHORIZED,
            AppError::AuthInvalid => StatusCode::FORBIDDEN,
            AppError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) | AppError::HttpsRequired => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ProviderRejected { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(StatusCode::is_client_error)
                .unwrap_or(StatusCode::BAD_REQUEST),
            AppError::ProviderServerError { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(StatusCode::is_server_error)
                .unwrap_or(StatusCode::BAD_GATEWAY),
            AppError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::AuthMissing => "auth_missing",
            AppError::AuthInvalid => "auth_invalid",
            AppError::ValidationFailed(_) => "validation_failed",
            AppError::BadRequest(_) => "bad_request",
            AppError::HttpsRequired => "https_required",
            AppError::PayloadTooLarge => "payload_too_large",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::ProviderRejected { .. } => "provider_rejected",
            AppError::ProviderServerError { .. } => "provider_error",
            AppError::ProviderUnavailable(_) => "provider_unavailable",
            AppError::Internal(_) => "internal_error",
            AppError::ConfigError(_) => "config_error",
        }
    }

    /// Message safe to show to the caller.
    fn client_detail(&self) -> String {
        match self {
            AppError::AuthMissing => "API Key header is missing".to_string(),
            AppError::AuthInvalid => "Invalid API Key".to_string(),
            AppError::ValidationFailed(msg) | AppError::BadRequest(msg) => msg.clone(),
            AppError::HttpsRequired => "HTTPS is required for all API calls".to_string(),
            AppError::PayloadTooLarge => "Request body is too large".to_string(),
            AppError::RateLimited { .. } => "Too many requests. Please try again later.".to_string(),
            AppError::ProviderRejected { detail, .. }
            | AppError::ProviderServerError { detail, .. } => {
                format!("WhatsApp API request failed: {detail}")
            }
            // Never expose network or internal details
            AppError::ProviderUnavailable(_) => {
                "Messaging provider is temporarily unavailable. Please try again later."
                    .to_string()
            }
            AppError::Internal(_) | AppError::ConfigError(_) => {
                "Internal server error while sending message".to_string()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Full details stay server-side
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let retry_after = match &self {
            AppError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        };

        let body = axum::Json(ErrorResponse {
            error: self.error_type(),
            detail: self.client_detail(),
            retry_after,
        });

        let mut response = (status, body).into_response();
        let headers = response.headers_mut();

        if let Some(secs) = retry_after {
            headers.insert(header::RETRY_AFTER, secs.into());
        }
        if matches!(self, AppError::AuthMissing) {
            headers.insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("API-Key"),
            );
        }

        response
    }
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::RejectedByProvider { status, detail } => {
                AppError::ProviderRejected { status, detail }
            }
            DeliveryError::ProviderServerError { status, detail } => {
                AppError::ProviderServerError { status, detail }
            }
            DeliveryError::ProviderUnavailable(detail) => AppError::ProviderUnavailable(detail),
            DeliveryError::UnexpectedResponse(detail) => AppError::Internal(detail),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => {
                AppError::ValidationFailed(sanitize_serde_error(&e.body_text()))
            }
            JsonRejection::JsonSyntaxError(_) => {
                AppError::ValidationFailed("Malformed JSON in request body".to_string())
            }
            JsonRejection::MissingJsonContentType(_) => {
                AppError::ValidationFailed(
                    "Expected request with `Content-Type: application/json`".to_string(),
                )
            }
            other if other.status() == StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge,
            other => AppError::BadRequest(other.body_text()),
        }
    }
}

/// Reduce a serde error message to something safe for clients.
///
/// Serde errors can name internal Rust types; only the field name is kept.
fn sanitize_serde_error(msg: &str) -> String {
    if let Some(field) = backticked(msg, "missing field") {
        return format!("Missing required field: {field}");
    }

    if let Some(field) = backticked(msg, "unknown field") {
        return format!("Unknown field: {field}");
    }

    if msg.contains("invalid type") {
        return "Invalid data type in request body".to_string();
    }

    if msg.contains("relative URL") || msg.contains("invalid URL") || msg.contains("empty host") {
        return "Invalid URL in request body".to_string();
    }

    if msg.contains("unknown variant") {
        return "Unsupported value in request body".to_string();
    }

    "Invalid request format".to_string()
}

/// First backtick-quoted token of `msg`, when `msg` contains `marker`.
fn backticked<'a>(msg: &'a str, marker: &str) -> Option<&'a str> {
    if !msg.contains(marker) {
        return None;
    }
    let start = msg.find('`')? + 1;
    let len = msg.get(start..)?.find('`')?;
    msg.get(start..start + len)
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
