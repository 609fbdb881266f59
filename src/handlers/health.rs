//! Info and health endpoints.
//!
//! - `GET /` - Service banner
//! - `GET /health` - Liveness with uptime
//!
//! Both are in the default auth bypass list.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::{HealthResponse, InfoResponse};
use crate::state::AppState;

/// Root endpoint.
///
/// ```json
/// {"message": "WhatsApp API Microservice", "status": "active", "version": "0.1.0"}
/// ```
pub async fn root() -> Json<InfoResponse> {
    Json(InfoResponse {
        message: "WhatsApp API Microservice",
        status: "active",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Health check endpoint.
///
/// The service has no hard dependencies to probe (the provider is only
/// contacted per message), so this always answers 200.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "uptime_seconds": 3600,
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
