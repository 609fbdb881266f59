use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Language, TemplateComponent, TemplateKind};

/// A request that resolves to one template message.
///
/// Lets the template endpoints share a single generic handler.
pub trait TemplateRequest {
    /// Split into the raw recipient and the template to send.
    fn into_parts(self) -> (String, TemplateKind);
}

/// Template reference in the generic request.
#[derive(Debug, Deserialize)]
pub struct TemplateRef {
    /// Approved template name
    pub name: String,
    /// Template language
    pub language: Language,
}

/// Request to send any approved template.
///
/// ```json
/// {
///   "to_number": "+14155552671",
///   "template": {"name": "promo", "language": {"code": "en_US"}},
///   "components": [{"type": "body", "parameters": [{"type": "text", "text": "Ana"}]}]
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct TemplateMessageRequest {
    /// Recipient in international format
    pub to_number: String,
    pub template: TemplateRef,
    /// Components forwarded as-is (optional)
    #[serde(default)]
    pub components: Vec<TemplateComponent>,
}

impl TemplateRequest for TemplateMessageRequest {
    fn into_parts(self) -> (String, TemplateKind) {
        let kind = TemplateKind::Generic {
            name: self.template.name,
            language: self.template.language,
            components: self.components,
        };
        (self.to_number, kind)
    }
}

/// Request for the `hello_world` template.
#[derive(Debug, Deserialize)]
pub struct HelloWorldRequest {
    pub to_number: String,
}

impl TemplateRequest for HelloWorldRequest {
    fn into_parts(self) -> (String, TemplateKind) {
        (self.to_number, TemplateKind::HelloWorld)
    }
}

/// Request for the `order_confirm` template.
#[derive(Debug, Deserialize)]
pub struct OrderConfirmRequest {
    pub to_number: String,
    /// Card brand shown in the body, e.g. "Visa"
    pub card_type: String,
    pub merchant_name: String,
    /// Kind of attached document, e.g. "invoice"
    pub document_type: String,
    /// Publicly reachable PDF attached as the header document
    pub pdf_url: Url,
}

impl TemplateRequest for OrderConfirmRequest {
    fn into_parts(self) -> (String, TemplateKind) {
        let kind = TemplateKind::OrderConfirm {
            card_type: self.card_type,
            merchant_name: self.merchant_name,
            document_type: self.document_type,
            pdf_url: self.pdf_url,
        };
        (self.to_number, kind)
    }
}

/// Request for the `account_created` template.
#[derive(Debug, Deserialize)]
pub struct AccountCreatedRequest {
    pub to_number: String,
    /// Account holder name
    pub name: String,
    /// How the account was verified, e.g. "email"
    pub verification_type: String,
}

impl TemplateRequest for AccountCreatedRequest {
    fn into_parts(self) -> (String, TemplateKind) {
        let kind = TemplateKind::AccountCreated {
            name: self.name,
            verification_type: self.verification_type,
        };
        (self.to_number, kind)
    }
}

/// Request to send free text.
#[derive(Debug, Deserialize)]
pub struct TextMessageRequest {
    pub to_number: String,
    /// Message body; validated and sanitized before sending
    pub message: String,
}

/// Response after the provider accepted a message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Whether the message was sent successfully
    pub success: bool,
    /// Provider message id, when the provider returned one
    pub message_id: Option<String>,
    /// Delivery status ("sent")
    pub status: &'static str,
}

impl MessageResponse {
    pub fn sent(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            status: "sent",
        }
    }
}

/// Root endpoint response.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub message: &'static str,
    pub status: &'static str,
    pub version: &'static str,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
    /// Seconds since startup
    pub uptime_seconds: u64,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::TemplateParameter;

    #[test]
    fn test_generic_request_components_default_empty() {
        let json = r#"{"to_number":"+14155552671","template":{"name":"promo","language":{"code":"es"}}}"#;
        let request: TemplateMessageRequest =
            serde_json::from_str(json).expect("Deserialization should succeed");

        assert!(request.components.is_empty());

        let (to, kind) = request.into_parts();
        assert_eq!(to, "+14155552671");
        assert_eq!(kind.name(), "promo");
    }

    #[test]
    fn test_generic_request_with_components() {
        let json = r#"{
            "to_number": "14155552671",
            "template": {"name": "promo", "language": {"code": "en_US"}},
            "components": [{"type": "body", "parameters": [{"type": "text", "text": "Ana"}]}]
        }"#;
        let request: TemplateMessageRequest = serde_json::from_str(json).unwrap();

        match request.into_parts().1 {
            TemplateKind::Generic { components, .. } => {
                assert_eq!(
                    components,
                    vec![TemplateComponent::body(vec![TemplateParameter::text("Ana")])]
                );
            }
            other => panic!("expected generic template, got {other:?}"),
        }
    }

    #[test]
    fn test_generic_request_requires_language() {
        let json = r#"{"to_number":"+14155552671","template":{"name":"promo"}}"#;
        let err = serde_json::from_str::<TemplateMessageRequest>(json).unwrap_err();
        assert!(err.to_string().contains("missing field `language`"));
    }

    #[test]
    fn test_order_confirm_rejects_bad_url() {
        let json = r#"{
            "to_number": "+14155552671",
            "card_type": "Visa",
            "merchant_name": "ACME",
            "document_type": "invoice",
            "pdf_url": "not a url"
        }"#;
        assert!(serde_json::from_str::<OrderConfirmRequest>(json).is_err());
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let json = r#"{"to_number":"+14155552671","message_type":"template"}"#;
        let request: HelloWorldRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.into_parts().1, TemplateKind::HelloWorld);
    }

    #[test]
    fn test_message_response_serialization() {
        let json = serde_json::to_value(MessageResponse::sent(Some("wamid.1".into()))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": true, "message_id": "wamid.1", "status": "sent"})
        );

        let json = serde_json::to_value(MessageResponse::sent(None)).unwrap();
        assert!(json["message_id"].is_null());
    }
}
