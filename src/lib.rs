//! # WhatsApp Relay
//!
//! An HTTP microservice that relays template and text messages to the
//! WhatsApp Cloud API, featuring:
//!
//! - **Security**: API key authentication, HTTPS enforcement, security headers
//! - **Fairness**: Per-client sliding-window rate limiting
//! - **Validation**: E.164 phone numbers, message length and content checks
//! - **Observability**: Request IDs, structured logging, Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Request ID → Trace → HTTPS → Auth → Rate Limit)│
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (info, health, messages)                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  MessageService (validation, sanitization, counting)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  WhatsAppClient (reqwest, bearer token, timeout)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  WhatsApp Cloud API (graph.facebook.com)                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use whatsapp_relay::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), whatsapp_relay::AppError> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config)?;
//!     let app = build_router(state.clone())?;
//!
//!     // Start the server...
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Security Configuration
//!
//! Enable API key authentication:
//! ```bash
//! API_KEY=your-secret-key cargo run
//! ```
//!
//! Tune rate limiting (requests per window, per client):
//! ```bash
//! RATE_LIMIT_MAX_REQUESTS=100 RATE_LIMIT_WINDOW_SECS=60 cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod provider;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::{Config, LogFormat};
pub use error::{AppError, AppResult};
pub use provider::WhatsAppClient;
pub use routes::build_router;
pub use state::AppState;
