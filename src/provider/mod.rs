//! Outbound client for the WhatsApp Business Cloud API.
//!
//! One message is one `POST {base}/{version}/{phone_number_id}/messages`
//! with a bearer token. There are no retries: failures are classified and
//! returned to the caller right away.
//!
//! # Error Classification
//!
//! | Outcome | Error |
//! |---------|-------|
//! | 2xx with a JSON body | `Ok(DeliveryReceipt)` |
//! | 2xx with an undecodable body | [`DeliveryError::UnexpectedResponse`] |
//! | 4xx | [`DeliveryError::RejectedByProvider`] |
//! | 5xx and anything else | [`DeliveryError::ProviderServerError`] |
//! | connect error, timeout | [`DeliveryError::ProviderUnavailable`] |

mod wire;

use std::time::Instant;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::MessageBody;
use crate::validation::NormalizedPhoneNumber;

use wire::{SendEnvelope, SendResponse};

/// Detail used when the provider sends an error status with an empty body.
pub const NO_ERROR_DETAILS: &str = "No error details available";

/// Why a delivery failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Provider answered 4xx.
    #[error("provider rejected the request ({status}): {detail}")]
    RejectedByProvider { status: u16, detail: String },

    /// Provider answered 5xx or another non-success status.
    #[error("provider failed ({status}): {detail}")]
    ProviderServerError { status: u16, detail: String },

    /// The provider could not be reached.
    #[error("provider unreachable: {0}")]
    ProviderUnavailable(String),

    /// The provider accepted the message but the answer could not be read.
    #[error("unexpected provider response: {0}")]
    UnexpectedResponse(String),
}

impl DeliveryError {
    fn outcome(&self) -> &'static str {
        match self {
            DeliveryError::RejectedByProvider { .. } => "rejected",
            DeliveryError::ProviderServerError { .. } => "server_error",
            DeliveryError::ProviderUnavailable(_) => "unavailable",
            DeliveryError::UnexpectedResponse(_) => "unexpected_response",
        }
    }
}

/// Proof of a successful hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Provider message id (`messages[0].id`), absent if the provider omitted it
    pub message_id: Option<String>,
}

/// WhatsApp Cloud API client.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct WhatsAppClient {
    http: reqwest::Client,
    endpoint: Url,
    auth_header: HeaderValue,
}

impl WhatsAppClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the endpoint URL or token cannot be
    /// used, or the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> AppResult<Self> {
        let endpoint = format!(
            "{}/{}/{}/messages",
            config.whatsapp_api_base_url.trim_end_matches('/'),
            config.whatsapp_api_version.trim_matches('/'),
            config.whatsapp_phone_number_id.trim_matches('/'),
        );
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| AppError::ConfigError(format!("Invalid provider endpoint '{endpoint}': {e}")))?;

        let mut auth_header =
            HeaderValue::from_str(&format!("Bearer {}", config.whatsapp_api_token)).map_err(
                |_| AppError::ConfigError("WHATSAPP_API_TOKEN contains invalid characters".into()),
            )?;
        auth_header.set_sensitive(true);

        let http = reqwest::Client::builder()
            .timeout(config.provider_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        if !config.provider_configured() {
            warn!("WHATSAPP_API_TOKEN or WHATSAPP_PHONE_NUMBER_ID is empty; provider calls will fail");
        }

        Ok(Self {
            http,
            endpoint,
            auth_header,
        })
    }

    /// Endpoint messages are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send one message.
    ///
    /// # Errors
    ///
    /// See the module docs for how failures are classified.
    pub async fn deliver(
        &self,
        to: &NormalizedPhoneNumber,
        body: &MessageBody,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let envelope = SendEnvelope::new(to.as_wire(), body);
        let start = Instant::now();

        info!(to = %to, kind = body.label(), "Sending WhatsApp message");
        debug!(payload = ?envelope, "Provider request payload");

        let result = self.post(&envelope).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        metrics::record_provider_duration(outcome, start.elapsed().as_secs_f64());

        match &result {
            Ok(receipt) => info!(
                to = %to,
                message_id = ?receipt.message_id,
                "WhatsApp message accepted"
            ),
            Err(e) => error!(to = %to, error = %e, "WhatsApp API request failed"),
        }

        result
    }

    async fn post(&self, envelope: &SendEnvelope<'_>) -> Result<DeliveryReceipt, DeliveryError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, self.auth_header.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(envelope)
            .send()
            .await
            .map_err(|e| DeliveryError::ProviderUnavailable(describe_transport_error(&e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DeliveryError::ProviderUnavailable(describe_transport_error(&e)))?;

        if status.is_success() {
            let parsed: SendResponse = serde_json::from_str(&text).map_err(|e| {
                DeliveryError::UnexpectedResponse(format!("invalid JSON in {status} response: {e}"))
            })?;

            return Ok(DeliveryReceipt {
                message_id: parsed.into_message_id(),
            });
        }

        let detail = error_detail(&text);
        if status.is_client_error() {
            Err(DeliveryError::RejectedByProvider {
                status: status.as_u16(),
                detail,
            })
        } else {
            Err(DeliveryError::ProviderServerError {
                status: status.as_u16(),
                detail,
            })
        }
    }
}

/// Error body as shown to callers: compact JSON, raw text, or a placeholder.
fn error_detail(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return NO_ERROR_DETAILS.to_string();
    }

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => json.to_string(),
        Err(_) => body.to_string(),
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
