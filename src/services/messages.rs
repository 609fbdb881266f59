//! Message sending: phone and content validation, payload building, delivery.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, instrument};

use crate::error::AppResult;
use crate::metrics;
use crate::models::{MessageBody, MessageResponse, OutboundMessage, TemplateKind};
use crate::provider::WhatsAppClient;
use crate::validation::{
    ContentError, NormalizedPhoneNumber, sanitize_message, validate_message_content,
};

/// Turns caller input into validated messages and hands them to the provider.
///
/// # Counter Memory Ordering
///
/// `messages_sent` uses `Ordering::Relaxed`: it is a monotonic counter read
/// only for reporting, nothing branches on it.
#[derive(Clone)]
pub struct MessageService {
    client: WhatsAppClient,
    /// Language for the fixed templates.
    default_language: Arc<str>,
    /// Messages accepted by the provider since startup.
    messages_sent: Arc<AtomicU64>,
}

impl MessageService {
    pub fn new(client: WhatsAppClient, default_language: impl Into<Arc<str>>) -> Self {
        Self {
            client,
            default_language: default_language.into(),
            messages_sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Send a template message.
    ///
    /// # Errors
    ///
    /// `ValidationFailed` for a malformed number, otherwise whatever the
    /// provider call maps to.
    #[instrument(skip(self, kind), fields(template = kind.name()))]
    pub async fn send_template(
        &self,
        to_number: &str,
        kind: TemplateKind,
    ) -> AppResult<MessageResponse> {
        let to = NormalizedPhoneNumber::parse(to_number)?;
        let body = MessageBody::Template(kind.into_payload(&self.default_language));

        self.deliver(OutboundMessage { to, body }).await
    }

    /// Send free text.
    ///
    /// The raw text is length-checked, then sanitized. Text that sanitizes
    /// down to nothing is refused as empty.
    ///
    /// # Errors
    ///
    /// `ValidationFailed` for a malformed number or unusable text, otherwise
    /// whatever the provider call maps to.
    #[instrument(skip(self, message), fields(message_len = message.len()))]
    pub async fn send_text(&self, to_number: &str, message: &str) -> AppResult<MessageResponse> {
        let to = NormalizedPhoneNumber::parse(to_number)?;
        validate_message_content(message)?;

        let sanitized = sanitize_message(message);
        if sanitized.is_empty() {
            return Err(ContentError::Empty.into());
        }

        self.deliver(OutboundMessage {
            to,
            body: MessageBody::Text(sanitized),
        })
        .await
    }

    async fn deliver(&self, message: OutboundMessage) -> AppResult<MessageResponse> {
        let label = message.body.label().to_string();

        match self.client.deliver(&message.to, &message.body).await {
            Ok(receipt) => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
                metrics::record_message_sent(&label, "sent");
                info!(to = %message.to, kind = %label, "Message sent");
                Ok(MessageResponse::sent(receipt.message_id))
            }
            Err(e) => {
                metrics::record_message_sent(&label, "failed");
                Err(e.into())
            }
        }
    }

    /// Messages accepted by the provider since startup.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::AppError;
    use httpmock::prelude::*;
    use serde_json::json;

    fn service(base_url: String) -> MessageService {
        let config = Config {
            whatsapp_api_base_url: base_url,
            whatsapp_api_token: "token".to_string(),
            whatsapp_phone_number_id: "77".to_string(),
            ..Config::default()
        };
        MessageService::new(WhatsAppClient::new(&config).unwrap(), "en_US")
    }

    #[tokio::test]
    async fn test_invalid_number_never_reaches_provider() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(Method::POST);
            then.status(200).json_body(json!({"messages": [{"id": "x"}]}));
        });

        let err = service(server.base_url())
            .send_template("+0123", TemplateKind::HelloWorld)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ValidationFailed(_)));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_text_is_sanitized_before_sending() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(Method::POST)
                .path("/v12.0/77/messages")
                .json_body(json!({
                    "messaging_product": "whatsapp",
                    "to": "14155552671",
                    "type": "text",
                    "text": {"body": "hi&lt;b&gt;"}
                }));
            then.status(200).json_body(json!({"messages": [{"id": "wamid.T"}]}));
        });

        let service = service(server.base_url());
        let response = service.send_text("14155552671", "hi\x07<b>\n").await.unwrap();

        mock.assert();
        assert_eq!(response.message_id.as_deref(), Some("wamid.T"));
        assert_eq!(service.messages_sent(), 1);
    }

    #[tokio::test]
    async fn test_text_that_sanitizes_to_nothing_is_refused() {
        let server = MockServer::start();
        let err = service(server.base_url())
            .send_text("+14155552671", "\n\t")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("cannot be empty"));
    }

    #[tokio::test]
    async fn test_text_too_long_is_refused() {
        let server = MockServer::start();
        let long = "a".repeat(crate::validation::MAX_MESSAGE_LENGTH + 1);
        let err = service(server.base_url())
            .send_text("+14155552671", &long)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_provider_failure_is_not_counted() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(Method::POST);
            then.status(500).body("boom");
        });

        let service = service(server.base_url());
        let err = service
            .send_template("+14155552671", TemplateKind::HelloWorld)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ProviderServerError { status: 500, .. }));
        assert_eq!(service.messages_sent(), 0);
    }
}
